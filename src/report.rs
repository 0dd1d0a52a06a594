//! Wires the six pipeline stages together and assembles the final report.

use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cfg::ControlFlowGraph;
use crate::classifier::{TargetClassification, TargetClassifier};
use crate::disassembler::Disassembler;
use crate::error::Result;
use crate::graph::{DataflowGraph, GraphBuilder};
use crate::patterns::{PatternDetector, PatternMatch};
use crate::risk::{RiskAssessor, RiskLevel};
use crate::tracer::StackTracer;

/// Options controlling a single analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub contract_address: Option<String>,
    pub network: Option<String>,
    /// `true` (the default) selects the CFG fixed-point tracer; `false`
    /// selects the faster, noisier linear mode.
    pub use_cfg: bool,
}

impl AnalyzeOptions {
    pub fn new() -> Self {
        AnalyzeOptions {
            contract_address: None,
            network: None,
            use_cfg: true,
        }
    }
}

impl Default for AnalyzeOptions {
    /// Delegates to [`AnalyzeOptions::new`] so the two can't disagree on the
    /// `use_cfg` default.
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteReport {
    pub id: String,
    pub pc: usize,
    pub classification: TargetClassification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternMatch>,
    pub risk: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(rename = "contractAddress", skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(rename = "bytecodeHash")]
    pub bytecode_hash: String,
    #[serde(rename = "delegatecallCount")]
    pub delegatecall_count: usize,
    #[serde(rename = "overallRisk", skip_serializing_if = "Option::is_none")]
    pub overall_risk: Option<RiskLevel>,
    pub sites: Vec<SiteReport>,
    #[serde(rename = "proxiesDetected")]
    pub proxies_detected: Vec<ProxyCount>,
    pub graph: DataflowGraph,
}

/// Run the full pipeline over a hex-encoded bytecode string. Total: never
/// panics, malformed hex is the only way this returns `Err`.
pub fn analyze(bytecode: &str, options: &AnalyzeOptions) -> Result<Report> {
    let bytecode_hash = hex::encode(Sha256::digest(bytecode.as_bytes()));

    debug!(stage = "disassemble", "decoding bytecode");
    let instructions = Disassembler::disassemble_hex(bytecode)?;

    let sites = if options.use_cfg {
        debug!(stage = "build_cfg", "partitioning basic blocks");
        let cfg = ControlFlowGraph::build(&instructions);
        debug!(stage = "trace_stack", blocks = cfg.block_count(), "tracing symbolic stack");
        StackTracer::trace_cfg(&cfg, &instructions)
    } else {
        debug!(stage = "trace_stack", mode = "linear", "tracing symbolic stack");
        StackTracer::trace_linear(&instructions)
    };

    debug!(stage = "classify", sites = sites.len(), "classifying targets");
    let classifications: Vec<TargetClassification> =
        sites.iter().map(|s| TargetClassifier::classify(&s.target)).collect();

    debug!(stage = "detect_patterns", "matching proxy idioms");
    let patterns = PatternDetector::detect(bytecode, &classifications);

    debug!(stage = "assess_risk", "scoring sites");
    let site_risks: Vec<RiskLevel> = classifications
        .iter()
        .zip(&patterns)
        .map(|(c, p)| RiskAssessor::site_risk(c.kind, p.as_ref()))
        .collect();
    let overall_risk = RiskAssessor::overall_risk(&site_risks);

    let graph = GraphBuilder::build(
        options.contract_address.as_deref(),
        &sites,
        &classifications,
        &patterns,
    );

    let site_reports: Vec<SiteReport> = sites
        .iter()
        .zip(classifications.into_iter())
        .zip(patterns.into_iter())
        .zip(site_risks.into_iter())
        .map(|(((site, classification), pattern), risk)| SiteReport {
            id: site.id.clone(),
            pc: site.pc,
            classification,
            pattern,
            risk,
            notes: None,
        })
        .collect();

    let proxies_detected = histogram(&site_reports);

    Ok(Report {
        contract_address: options.contract_address.clone(),
        network: options.network.clone(),
        bytecode_hash,
        delegatecall_count: site_reports.len(),
        overall_risk,
        sites: site_reports,
        proxies_detected,
        graph,
    })
}

fn histogram(sites: &[SiteReport]) -> Vec<ProxyCount> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for site in sites {
        if let Some(pattern) = &site.pattern {
            *counts.entry(pattern.name.as_str().to_string()).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .map(|(name, count)| ProxyCount { name, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_proxy_scenario_s1() {
        let bytecode = "0x363d3d373d3d3d363d73aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa5af43d82803e903d91602b57fd5bf3";
        let report = analyze(bytecode, &AnalyzeOptions::new()).unwrap();
        assert_eq!(report.delegatecall_count, 1);
        assert_eq!(report.sites[0].classification.kind, crate::classifier::TargetKind::Hardcoded);
        assert_eq!(
            report.sites[0].classification.address_literal.as_deref(),
            Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
        assert_eq!(report.sites[0].pattern.as_ref().unwrap().name.as_str(), "EIP-1167");
        assert_eq!(report.sites[0].risk, RiskLevel::Medium);
        assert_eq!(report.overall_risk, Some(RiskLevel::Medium));
        assert_eq!(report.proxies_detected.len(), 1);
        assert_eq!(report.proxies_detected[0].name, "EIP-1167");
        assert_eq!(report.proxies_detected[0].count, 1);
    }

    #[test]
    fn calldata_controlled_target_scenario_s3() {
        let bytecode = "0x6000356000f4";
        let report = analyze(bytecode, &AnalyzeOptions::new()).unwrap();
        assert_eq!(report.sites.len(), 1);
        assert_eq!(report.sites[0].classification.kind, crate::classifier::TargetKind::Calldata);
        assert!(report.sites[0].pattern.is_none());
        assert_eq!(report.sites[0].risk, RiskLevel::High);
        assert_eq!(report.overall_risk, Some(RiskLevel::High));
    }

    #[test]
    fn empty_bytecode_scenario_s4() {
        for bytecode in ["0x", ""] {
            let report = analyze(bytecode, &AnalyzeOptions::new()).unwrap();
            assert_eq!(report.delegatecall_count, 0);
            assert!(report.sites.is_empty());
            assert!(report.overall_risk.is_none());
            assert!(report.proxies_detected.is_empty());
        }
    }

    #[test]
    fn diamond_scenario_s5() {
        // Two DELEGATECALLs, each preceded by SLOAD of a distinct literal slot.
        let mut bytecode = vec![];
        for slot in [0x01u8, 0x02u8] {
            for _ in 0..4 {
                bytecode.extend([0x60, 0x00]); // filler args (outSize, outOffset, inSize, inOffset)
            }
            bytecode.extend([0x60, slot]); // PUSH1 slot
            bytecode.push(0x54); // SLOAD -> target ("to") lands just below gas
            bytecode.extend([0x60, 0x00]); // gas
            bytecode.push(0xf4); // DELEGATECALL
        }
        let hex = format!("0x{}", hex::encode(&bytecode));
        let report = analyze(&hex, &AnalyzeOptions::new()).unwrap();
        assert_eq!(report.sites.len(), 2);
        for site in &report.sites {
            assert_eq!(site.classification.kind, crate::classifier::TargetKind::Storage);
            assert_eq!(site.risk, RiskLevel::Medium);
            assert_eq!(site.pattern.as_ref().unwrap().name.as_str(), "Diamond");
        }
        assert_eq!(report.proxies_detected[0].name, "Diamond");
        assert_eq!(report.proxies_detected[0].count, 2);
    }

    #[test]
    fn hash_is_stable_sha256_of_input_as_provided() {
        let bytecode = "0x600035";
        let a = analyze(bytecode, &AnalyzeOptions::new()).unwrap();
        let b = analyze(bytecode, &AnalyzeOptions::new()).unwrap();
        assert_eq!(a.bytecode_hash, b.bytecode_hash);
        assert_eq!(a.bytecode_hash, hex::encode(Sha256::digest(bytecode.as_bytes())));
    }

    #[test]
    fn malformed_hex_is_an_error() {
        assert!(analyze("0xzz", &AnalyzeOptions::new()).is_err());
    }

    #[test]
    fn sites_are_sorted_ascending_by_pc() {
        let bytecode = "0x363d3d373d3d3d363d73aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa5af43d82803e903d91602b57fd5bf3";
        let report = analyze(bytecode, &AnalyzeOptions::new()).unwrap();
        let pcs: Vec<usize> = report.sites.iter().map(|s| s.pc).collect();
        let mut sorted = pcs.clone();
        sorted.sort_unstable();
        assert_eq!(pcs, sorted);
    }

    #[test]
    fn linear_mode_runs_the_same_scenarios() {
        let bytecode = "0x363d3d373d3d3d363d73aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa5af43d82803e903d91602b57fd5bf3";
        let options = AnalyzeOptions {
            use_cfg: false,
            ..AnalyzeOptions::new()
        };
        let report = analyze(bytecode, &options).unwrap();
        assert_eq!(report.delegatecall_count, 1);
        assert_eq!(report.sites[0].classification.kind, crate::classifier::TargetKind::Hardcoded);
    }

    #[test]
    fn default_options_agree_with_new_on_cfg_mode() {
        assert_eq!(AnalyzeOptions::default().use_cfg, AnalyzeOptions::new().use_cfg);
        assert!(AnalyzeOptions::default().use_cfg);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn analyze_never_panics_on_arbitrary_hex(bytecode in "[0-9a-f]{0,256}") {
                let _ = analyze(&bytecode, &AnalyzeOptions::new());
                let _ = analyze(&bytecode, &AnalyzeOptions { use_cfg: false, ..AnalyzeOptions::new() });
            }

            #[test]
            fn overall_risk_is_absent_iff_sites_empty(bytecode in "[0-9a-f]{0,256}") {
                if let Ok(report) = analyze(&bytecode, &AnalyzeOptions::new()) {
                    prop_assert_eq!(report.sites.is_empty(), report.overall_risk.is_none());
                }
            }
        }
    }
}
