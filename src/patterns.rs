//! Recognizes well-known proxy idioms from byte-level patterns and the set
//! of storage slots observed across DELEGATECALL sites.

use std::collections::HashSet;

use serde::Serialize;

use crate::classifier::{TargetClassification, TargetKind};
use crate::disassembler::decode_hex;

/// The well-known UUPS (EIP-1822) rotation slot.
pub const UUPS_SLOT: &str = "0xc5f16f0fcc639fa48a6947836d9850f504798523bf8c9a3a87d5876cf622bcf7";

const EIP1167_PREFIX: &str = "363d3d373d3d3d363d73";
const EIP1167_SUFFIX: &str = "5af43d82803e903d91602b57fd5bf3";
/// Minimum gap (hex chars) between prefix end and suffix start: a 20-byte
/// implementation address is 40 hex characters.
const EIP1167_MIN_GAP_HEX_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatternName {
    #[serde(rename = "EIP-1167")]
    Eip1167,
    #[serde(rename = "EIP-1967")]
    Eip1967,
    #[serde(rename = "UUPS")]
    Uups,
    #[serde(rename = "Diamond")]
    Diamond,
}

impl PatternName {
    /// The canonical spec-facing string, matching the serde rename above.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternName::Eip1167 => "EIP-1167",
            PatternName::Eip1967 => "EIP-1967",
            PatternName::Uups => "UUPS",
            PatternName::Diamond => "Diamond",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternMatch {
    pub name: PatternName,
    pub description: String,
}

pub struct PatternDetector;

impl PatternDetector {
    /// Attach at most one pattern match to each site's classification,
    /// returning a parallel vector of optional matches in site order.
    pub fn detect(bytecode_hex: &str, classifications: &[TargetClassification]) -> Vec<Option<PatternMatch>> {
        if classifications.len() >= 1 && is_eip1167(bytecode_hex) {
            return classifications
                .iter()
                .map(|_| {
                    Some(PatternMatch {
                        name: PatternName::Eip1167,
                        description: "EIP-1167 minimal proxy: clones a single implementation"
                            .to_string(),
                    })
                })
                .collect();
        }

        let slots: HashSet<&str> = classifications
            .iter()
            .filter_map(|c| c.storage_slot_literal.as_deref())
            .collect();
        let has_uups_slot = slots.contains(UUPS_SLOT);

        let mut result: Vec<Option<PatternMatch>> = classifications
            .iter()
            .map(|c| {
                if c.storage_slot_literal.as_deref() == Some(crate::classifier::EIP1967_IMPLEMENTATION_SLOT) {
                    if has_uups_slot {
                        Some(PatternMatch {
                            name: PatternName::Uups,
                            description: "UUPS (EIP-1822) upgradeable proxy".to_string(),
                        })
                    } else {
                        Some(PatternMatch {
                            name: PatternName::Eip1967,
                            description: "EIP-1967 transparent proxy storage slot".to_string(),
                        })
                    }
                } else {
                    None
                }
            })
            .collect();

        let storage_slots: HashSet<&str> = classifications
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == TargetKind::Storage)
            .filter_map(|(_, c)| c.storage_slot_literal.as_deref())
            .collect();
        let storage_site_count = classifications.iter().filter(|c| c.kind == TargetKind::Storage).count();

        if storage_site_count >= 2 && storage_slots.len() >= 2 {
            for (i, c) in classifications.iter().enumerate() {
                if result[i].is_some() {
                    continue;
                }
                if c.kind == TargetKind::Storage {
                    result[i] = Some(PatternMatch {
                        name: PatternName::Diamond,
                        description: "Diamond (EIP-2535): multiple facet addresses via storage"
                            .to_string(),
                    });
                }
            }
        }

        result
    }
}

fn is_eip1167(bytecode_hex: &str) -> bool {
    let bytes = match decode_hex(bytecode_hex) {
        Ok(b) => b,
        Err(_) => return false,
    };
    let lower = hex::encode(&bytes);
    match lower.find(EIP1167_PREFIX) {
        Some(prefix_at) => {
            let after_prefix = prefix_at + EIP1167_PREFIX.len();
            let search_from = after_prefix + EIP1167_MIN_GAP_HEX_CHARS;
            if search_from > lower.len() {
                return false;
            }
            lower[search_from..].contains(EIP1167_SUFFIX)
        }
        None => false,
    }
}
