//! The abstract value domain the stack tracer operates over.

/// A tagged value representing an abstract stack slot.
///
/// Equality and hashing are structural (derived), per the design notes —
/// no serialization round-trip is used to compare states.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StackExpression {
    /// A literal hex value, typically a PUSH immediate.
    Literal(String),
    /// Value loaded from storage at slot expression `E`.
    Storage(Box<StackExpression>),
    /// Value loaded from calldata at offset expression `E`.
    Calldata(Box<StackExpression>),
    /// One of the opaque environment sources.
    Environment(EnvironmentSource),
    /// An arithmetic/logical operation applied to its arguments.
    Op(String, Vec<StackExpression>),
    /// Provenance lost: a join of distinct expressions, an unmodeled
    /// opcode's output, or an out-of-bounds read.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentSource {
    Caller,
    Address,
    Origin,
}

impl StackExpression {
    pub fn literal(hex: impl Into<String>) -> Self {
        StackExpression::Literal(hex.into())
    }
}

/// The stack plus a deliberately approximated memory: writes discard their
/// arguments, reads always yield `Unknown`. Memory therefore carries no
/// state at all and is omitted from the struct entirely.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AbstractState {
    pub stack: Vec<StackExpression>,
}

impl AbstractState {
    pub fn empty() -> Self {
        AbstractState { stack: Vec::new() }
    }

    pub fn push(&mut self, expr: StackExpression) {
        self.stack.push(expr);
    }

    /// Pop one slot. Popping an empty stack yields `Unknown`, never an error.
    pub fn pop(&mut self) -> StackExpression {
        self.stack.pop().unwrap_or(StackExpression::Unknown)
    }

    /// Join two states reached along different predecessor paths.
    ///
    /// Differing depths produce a stack of the common (shorter) depth, all
    /// `Unknown`. Matching depths join element-wise: identical expressions
    /// survive, differing ones become `Unknown`.
    pub fn join(a: &AbstractState, b: &AbstractState) -> AbstractState {
        if a.stack.len() != b.stack.len() {
            let depth = a.stack.len().min(b.stack.len());
            return AbstractState {
                stack: vec![StackExpression::Unknown; depth],
            };
        }
        let stack = a
            .stack
            .iter()
            .zip(b.stack.iter())
            .map(|(x, y)| {
                if x == y {
                    x.clone()
                } else {
                    StackExpression::Unknown
                }
            })
            .collect();
        AbstractState { stack }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_on_empty_stack_is_unknown_not_error() {
        let mut s = AbstractState::empty();
        assert_eq!(s.pop(), StackExpression::Unknown);
    }

    #[test]
    fn join_keeps_identical_expressions() {
        let a = AbstractState {
            stack: vec![StackExpression::literal("0x01")],
        };
        let b = AbstractState {
            stack: vec![StackExpression::literal("0x01")],
        };
        let joined = AbstractState::join(&a, &b);
        assert_eq!(joined.stack, vec![StackExpression::literal("0x01")]);
    }

    #[test]
    fn join_replaces_differing_expressions_with_unknown() {
        let a = AbstractState {
            stack: vec![StackExpression::literal("0x01")],
        };
        let b = AbstractState {
            stack: vec![StackExpression::literal("0x02")],
        };
        let joined = AbstractState::join(&a, &b);
        assert_eq!(joined.stack, vec![StackExpression::Unknown]);
    }

    #[test]
    fn join_of_differing_depths_is_all_unknown_at_common_depth() {
        let a = AbstractState {
            stack: vec![StackExpression::literal("0x01"), StackExpression::literal("0x02")],
        };
        let b = AbstractState {
            stack: vec![StackExpression::literal("0x01")],
        };
        let joined = AbstractState::join(&a, &b);
        assert_eq!(joined.stack, vec![StackExpression::Unknown]);
    }
}
