//! Per-site and overall risk assessment.

use serde::Serialize;

use crate::classifier::TargetKind;
use crate::patterns::{PatternMatch, PatternName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    // Sorts above High: "we could not prove it safe".
    Unknown,
}

pub struct RiskAssessor;

impl RiskAssessor {
    pub fn site_risk(kind: TargetKind, pattern: Option<&PatternMatch>) -> RiskLevel {
        match kind {
            TargetKind::Hardcoded => {
                if matches!(pattern.map(|p| p.name), Some(PatternName::Eip1167)) {
                    RiskLevel::Medium
                } else {
                    RiskLevel::Low
                }
            }
            TargetKind::Storage => RiskLevel::Medium,
            TargetKind::Calldata | TargetKind::Dynamic => RiskLevel::High,
            TargetKind::Unknown => RiskLevel::Unknown,
        }
    }

    /// Maximum site risk under `low < medium < high < unknown`. `None` iff
    /// there are no sites.
    pub fn overall_risk(site_risks: &[RiskLevel]) -> Option<RiskLevel> {
        site_risks.iter().copied().max()
    }
}
