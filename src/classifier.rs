//! Classifies the symbolic target expression of a DELEGATECALL site.

use alloy_primitives::Address;
use serde::Serialize;

use crate::symbolic::StackExpression;

/// The well-known EIP-1967 implementation storage slot,
/// `keccak256("eip1967.proxy.implementation") - 1`.
pub const EIP1967_IMPLEMENTATION_SLOT: &str =
    "0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Hardcoded,
    Storage,
    Calldata,
    Dynamic,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetClassification {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    #[serde(rename = "addressLiteral", skip_serializing_if = "Option::is_none")]
    pub address_literal: Option<String>,
    #[serde(rename = "storageSlotLiteral", skip_serializing_if = "Option::is_none")]
    pub storage_slot_literal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl TargetClassification {
    fn unknown() -> Self {
        TargetClassification {
            kind: TargetKind::Unknown,
            address_literal: None,
            storage_slot_literal: None,
            details: None,
        }
    }
}

/// Strip `0x` and lowercase a hex string for comparison/storage.
pub fn normalize_hex(s: &str) -> String {
    s.strip_prefix("0x").unwrap_or(s).to_lowercase()
}

pub struct TargetClassifier;

impl TargetClassifier {
    pub fn classify(target: &StackExpression) -> TargetClassification {
        match target {
            StackExpression::Literal(v) => {
                let normalized = normalize_hex(v);
                match normalized.len() == 40 {
                    true => {
                        // Round-trip through alloy_primitives::Address so the
                        // emitted literal is a well-formed 20-byte address,
                        // not just a same-length hex string.
                        let address_literal = format!("0x{normalized}")
                            .parse::<Address>()
                            .map(|a| a.to_string().to_lowercase())
                            .unwrap_or_else(|_| format!("0x{normalized}"));
                        TargetClassification {
                            kind: TargetKind::Hardcoded,
                            address_literal: Some(address_literal),
                            storage_slot_literal: None,
                            details: None,
                        }
                    }
                    false => TargetClassification {
                        kind: TargetKind::Unknown,
                        address_literal: None,
                        storage_slot_literal: None,
                        details: Some(format!("literal({v})")),
                    },
                }
            }
            StackExpression::Storage(slot_expr) => match slot_expr.as_ref() {
                StackExpression::Literal(s) => {
                    let normalized = format!("0x{}", normalize_hex(s));
                    let details = if normalized == EIP1967_IMPLEMENTATION_SLOT {
                        Some("EIP-1967 implementation slot".to_string())
                    } else {
                        None
                    };
                    TargetClassification {
                        kind: TargetKind::Storage,
                        address_literal: None,
                        storage_slot_literal: Some(normalized),
                        details,
                    }
                }
                _ => TargetClassification {
                    kind: TargetKind::Storage,
                    address_literal: None,
                    storage_slot_literal: None,
                    details: Some("non-literal storage slot".to_string()),
                },
            },
            StackExpression::Calldata(_) => TargetClassification {
                kind: TargetKind::Calldata,
                address_literal: None,
                storage_slot_literal: None,
                details: Some("derived from CALLDATALOAD".to_string()),
            },
            StackExpression::Op(name, _) => TargetClassification {
                kind: TargetKind::Dynamic,
                address_literal: None,
                storage_slot_literal: None,
                details: Some(format!("op({name})")),
            },
            StackExpression::Environment(_) | StackExpression::Unknown => {
                TargetClassification::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_of_address_length_is_hardcoded() {
        let target = StackExpression::literal("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let c = TargetClassifier::classify(&target);
        assert_eq!(c.kind, TargetKind::Hardcoded);
        assert_eq!(
            c.address_literal.as_deref(),
            Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
    }

    #[test]
    fn literal_of_wrong_length_is_unknown() {
        let target = StackExpression::literal("0x01");
        let c = TargetClassifier::classify(&target);
        assert_eq!(c.kind, TargetKind::Unknown);
        assert_eq!(c.details.as_deref(), Some("literal(0x01)"));
    }

    #[test]
    fn storage_with_eip1967_slot_is_tagged() {
        let target = StackExpression::Storage(Box::new(StackExpression::literal(
            EIP1967_IMPLEMENTATION_SLOT,
        )));
        let c = TargetClassifier::classify(&target);
        assert_eq!(c.kind, TargetKind::Storage);
        assert_eq!(c.storage_slot_literal.as_deref(), Some(EIP1967_IMPLEMENTATION_SLOT));
        assert_eq!(c.details.as_deref(), Some("EIP-1967 implementation slot"));
    }

    #[test]
    fn storage_with_other_literal_slot_has_generic_details() {
        let target = StackExpression::Storage(Box::new(StackExpression::literal("0x05")));
        let c = TargetClassifier::classify(&target);
        assert_eq!(c.kind, TargetKind::Storage);
        assert_eq!(c.details.as_deref(), None);
    }

    #[test]
    fn storage_with_non_literal_slot_is_generic() {
        let target = StackExpression::Storage(Box::new(StackExpression::Unknown));
        let c = TargetClassifier::classify(&target);
        assert_eq!(c.kind, TargetKind::Storage);
        assert_eq!(c.storage_slot_literal, None);
        assert_eq!(c.details.as_deref(), Some("non-literal storage slot"));
    }

    #[test]
    fn calldata_is_classified() {
        let target = StackExpression::Calldata(Box::new(StackExpression::literal("0x04")));
        let c = TargetClassifier::classify(&target);
        assert_eq!(c.kind, TargetKind::Calldata);
    }

    #[test]
    fn op_is_dynamic() {
        let target = StackExpression::Op(
            "ADD".to_string(),
            vec![StackExpression::literal("0x01"), StackExpression::literal("0x02")],
        );
        let c = TargetClassifier::classify(&target);
        assert_eq!(c.kind, TargetKind::Dynamic);
        assert_eq!(c.details.as_deref(), Some("op(ADD)"));
    }

    #[test]
    fn environment_and_unknown_are_unknown() {
        assert_eq!(
            TargetClassifier::classify(&StackExpression::Environment(
                crate::symbolic::EnvironmentSource::Caller
            ))
            .kind,
            TargetKind::Unknown
        );
        assert_eq!(TargetClassifier::classify(&StackExpression::Unknown).kind, TargetKind::Unknown);
    }
}
