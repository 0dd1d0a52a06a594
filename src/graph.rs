//! Builds the dataflow graph that accompanies a report: one contract node
//! fanning out to the targets its DELEGATECALL sites resolve to.

use indexmap::IndexMap;
use serde::Serialize;

use crate::classifier::TargetClassification;
use crate::patterns::PatternMatch;
use crate::tracer::DelegatecallSite;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Contract,
    Implementation,
    Facet,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DataflowGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

pub struct GraphBuilder;

impl GraphBuilder {
    pub fn build(
        contract_address: Option<&str>,
        sites: &[DelegatecallSite],
        classifications: &[TargetClassification],
        patterns: &[Option<PatternMatch>],
    ) -> DataflowGraph {
        let contract_id = match contract_address {
            Some(addr) => format!("contract:{addr}"),
            None => "contract:unknown".to_string(),
        };

        // IndexMap keeps first-seen insertion order for deterministic output
        // while still letting repeated target ids coalesce into one node.
        let mut nodes: IndexMap<String, NodeKind> = IndexMap::new();
        nodes.insert(contract_id.clone(), NodeKind::Contract);

        let mut implementation_refs: IndexMap<String, usize> = IndexMap::new();
        let mut edges = Vec::new();

        for ((site, classification), pattern) in sites.iter().zip(classifications).zip(patterns) {
            let pattern_name = pattern.as_ref().map(|p| p.name.as_str().to_string());

            if let Some(addr) = &classification.address_literal {
                let node_id = format!("impl:{addr}");
                *implementation_refs.entry(node_id.clone()).or_insert(0) += 1;
                nodes.entry(node_id.clone()).or_insert(NodeKind::Implementation);
                edges.push(GraphEdge {
                    from: contract_id.clone(),
                    to: node_id,
                    label: pattern_name.unwrap_or_else(|| "DELEGATECALL".to_string()),
                });
            } else if let Some(slot) = &classification.storage_slot_literal {
                let node_id = format!("storage:{slot}");
                nodes.entry(node_id.clone()).or_insert(NodeKind::Unknown);
                let prefix: String = slot.chars().take(10).collect();
                let label_prefix = pattern_name.unwrap_or_else(|| "Storage Proxy".to_string());
                edges.push(GraphEdge {
                    from: contract_id.clone(),
                    to: node_id,
                    label: format!("{label_prefix} (slot: {prefix}\u{2026})"),
                });
            } else {
                let node_id = format!("unknown:{}", site.id);
                nodes.insert(node_id.clone(), NodeKind::Unknown);
                edges.push(GraphEdge {
                    from: contract_id.clone(),
                    to: node_id,
                    label: "DELEGATECALL (dynamic)".to_string(),
                });
            }
        }

        for (node_id, count) in implementation_refs {
            if count >= 2 {
                if let Some(kind) = nodes.get_mut(&node_id) {
                    *kind = NodeKind::Facet;
                }
            }
        }

        let node_list = nodes
            .into_iter()
            .map(|(id, kind)| GraphNode { id, kind })
            .collect();

        DataflowGraph {
            nodes: node_list,
            edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TargetKind;
    use crate::patterns::PatternName;
    use crate::symbolic::StackExpression;

    fn site(pc: usize) -> DelegatecallSite {
        DelegatecallSite {
            id: format!("site-{pc}"),
            pc,
            block_leader: 0,
            target: StackExpression::Unknown,
        }
    }

    fn hardcoded(addr: &str) -> TargetClassification {
        TargetClassification {
            kind: TargetKind::Hardcoded,
            address_literal: Some(addr.to_string()),
            storage_slot_literal: None,
            details: None,
        }
    }

    #[test]
    fn single_hardcoded_site_yields_contract_and_impl_node() {
        let sites = vec![site(10)];
        let classifications = vec![hardcoded("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")];
        let patterns = vec![Some(PatternMatch {
            name: PatternName::Eip1167,
            description: String::new(),
        })];
        let graph = GraphBuilder::build(None, &sites, &classifications, &patterns);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].label, "EIP-1167");
    }

    #[test]
    fn repeated_implementation_becomes_facet() {
        let sites = vec![site(1), site(2)];
        let addr = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
        let classifications = vec![hardcoded(addr), hardcoded(addr)];
        let patterns = vec![None, None];
        let graph = GraphBuilder::build(Some("0xcontract"), &sites, &classifications, &patterns);
        let impl_node = graph.nodes.iter().find(|n| n.id == format!("impl:{addr}")).unwrap();
        assert_eq!(impl_node.kind, NodeKind::Facet);
    }

    #[test]
    fn unknown_target_gets_unique_node() {
        let sites = vec![site(5)];
        let classifications = vec![TargetClassification {
            kind: TargetKind::Unknown,
            address_literal: None,
            storage_slot_literal: None,
            details: None,
        }];
        let patterns = vec![None];
        let graph = GraphBuilder::build(None, &sites, &classifications, &patterns);
        assert!(graph.nodes.iter().any(|n| n.id == "unknown:site-5"));
        assert_eq!(graph.edges[0].label, "DELEGATECALL (dynamic)");
    }

    #[test]
    fn storage_target_uses_truncated_slot_label() {
        let sites = vec![site(3)];
        let classifications = vec![TargetClassification {
            kind: TargetKind::Storage,
            address_literal: None,
            storage_slot_literal: Some(
                "0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc".to_string(),
            ),
            details: None,
        }];
        let patterns = vec![Some(PatternMatch {
            name: PatternName::Eip1967,
            description: String::new(),
        })];
        let graph = GraphBuilder::build(None, &sites, &classifications, &patterns);
        assert!(graph.edges[0].label.starts_with("EIP-1967 (slot: "));
    }
}
