//! Forward abstract interpretation over the CFG (or, in linear mode, over
//! the raw instruction stream) recovering the symbolic stack at each
//! DELEGATECALL site.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;

use crate::cfg::ControlFlowGraph;
use crate::disassembler::Instruction;
use crate::symbolic::{AbstractState, EnvironmentSource, StackExpression};

/// A DELEGATECALL instruction together with the symbolic target expression
/// recovered for it. Classification and pattern matching are attached by
/// later pipeline stages.
#[derive(Debug, Clone)]
pub struct DelegatecallSite {
    pub id: String,
    pub pc: usize,
    pub block_leader: usize,
    pub target: StackExpression,
}

pub struct StackTracer;

impl StackTracer {
    /// Trace every DELEGATECALL site using a CFG fixed point (§4.3).
    pub fn trace_cfg(cfg: &ControlFlowGraph, instructions: &[Instruction]) -> Vec<DelegatecallSite> {
        let out_states = run_fixed_point(cfg);

        let mut sites = Vec::new();
        for ins in instructions {
            if ins.mnemonic != "DELEGATECALL" {
                continue;
            }
            let block = match cfg.block_containing(ins.pc) {
                Some(b) => b,
                None => continue,
            };
            let input = compute_input(cfg, block.leader, &out_states);
            let mut state = input;
            for prior in &block.instructions {
                if prior.pc == ins.pc {
                    break;
                }
                apply(&mut state, prior);
            }
            sites.push(DelegatecallSite {
                id: format!("site-{}", ins.pc),
                pc: ins.pc,
                block_leader: block.leader,
                target: target_of(&state),
            });
        }
        sites.sort_by_key(|s| s.pc);
        sites
    }

    /// Trace sites by applying the transfer function linearly over the
    /// instruction stream, ignoring control flow entirely (§4.3 "Linear
    /// fallback mode"). Faster, noisier, but agrees with CFG mode on
    /// straight-line code.
    pub fn trace_linear(instructions: &[Instruction]) -> Vec<DelegatecallSite> {
        let mut state = AbstractState::empty();
        let mut sites = Vec::new();

        for ins in instructions {
            if ins.mnemonic == "DELEGATECALL" {
                sites.push(DelegatecallSite {
                    id: format!("site-{}", ins.pc),
                    pc: ins.pc,
                    block_leader: ins.pc,
                    target: target_of(&state),
                });
                // Bespoke shortcut (§9): model the pushed return value by
                // shrinking the stack by one rather than popping 6/pushing
                // Unknown via the generic fallback.
                state.stack.pop();
                continue;
            }
            apply(&mut state, ins);
        }
        sites
    }
}

/// Recover the `to` argument from the stack immediately before DELEGATECALL
/// executes: `(gas, to, inOffset, inSize, outOffset, outSize)` with `to` at
/// depth 2 from the top.
fn target_of(state: &AbstractState) -> StackExpression {
    let len = state.stack.len();
    if len < 2 {
        StackExpression::Unknown
    } else {
        state.stack[len - 2].clone()
    }
}

fn compute_input(
    cfg: &ControlFlowGraph,
    leader: usize,
    out_states: &IndexMap<usize, AbstractState>,
) -> AbstractState {
    let block = &cfg.blocks[&leader];
    if block.predecessors.is_empty() {
        return out_states.get(&leader).cloned().unwrap_or_else(AbstractState::empty);
    }
    let mut joined: Option<AbstractState> = None;
    for &pred in &block.predecessors {
        if let Some(pred_out) = out_states.get(&pred) {
            joined = Some(match joined {
                None => pred_out.clone(),
                Some(acc) => AbstractState::join(&acc, pred_out),
            });
        }
    }
    joined.unwrap_or_else(AbstractState::empty)
}

fn run_fixed_point(cfg: &ControlFlowGraph) -> IndexMap<usize, AbstractState> {
    let mut out_states: IndexMap<usize, AbstractState> = IndexMap::new();
    if let Some(entry) = cfg.entry {
        out_states.insert(entry, AbstractState::empty());
    }

    let mut worklist: VecDeque<usize> = cfg.blocks.keys().copied().collect();
    let mut queued: HashSet<usize> = worklist.iter().copied().collect();

    while let Some(leader) = worklist.pop_front() {
        queued.remove(&leader);
        let block = &cfg.blocks[&leader];
        let input = compute_input(cfg, leader, &out_states);

        let mut state = input;
        for ins in &block.instructions {
            apply(&mut state, ins);
        }

        let changed = out_states.get(&leader).map(|s| s.stack != state.stack).unwrap_or(true);
        if changed {
            out_states.insert(leader, state);
            for &succ in &block.successors {
                if queued.insert(succ) {
                    worklist.push_back(succ);
                }
            }
        }
    }

    out_states
}

/// The per-instruction transfer function (§4.3).
fn apply(state: &mut AbstractState, ins: &Instruction) {
    if let Some(imm) = &ins.immediate {
        state.push(StackExpression::literal(imm.clone()));
        return;
    }

    match ins.mnemonic.as_str() {
        "CALLDATALOAD" => {
            let offset = state.pop();
            state.push(StackExpression::Calldata(Box::new(offset)));
        }
        "SLOAD" => {
            let slot = state.pop();
            state.push(StackExpression::Storage(Box::new(slot)));
        }
        "CALLER" => state.push(StackExpression::Environment(EnvironmentSource::Caller)),
        "ADDRESS" => state.push(StackExpression::Environment(EnvironmentSource::Address)),
        "ORIGIN" => state.push(StackExpression::Environment(EnvironmentSource::Origin)),
        "MLOAD" => {
            state.pop();
            state.push(StackExpression::Unknown);
        }
        "MSTORE" | "MSTORE8" => {
            state.pop();
            state.pop();
        }
        "POP" => {
            state.pop();
        }
        "ADD" | "SUB" | "MUL" | "DIV" | "MOD" | "AND" | "OR" | "XOR" | "EQ" | "LT" | "GT" => {
            let a = state.pop();
            let b = state.pop();
            state.push(StackExpression::Op(ins.mnemonic.clone(), vec![a, b]));
        }
        "ISZERO" => {
            let a = state.pop();
            state.push(StackExpression::Op("ISZERO".to_string(), vec![a]));
        }
        _ if ins.mnemonic.starts_with("DUP") => {
            let n: usize = ins.mnemonic[3..].parse().unwrap_or(1);
            let len = state.stack.len();
            if n == 0 || n > len {
                state.push(StackExpression::Unknown);
            } else {
                let val = state.stack[len - n].clone();
                state.push(val);
            }
        }
        _ if ins.mnemonic.starts_with("SWAP") => {
            let n: usize = ins.mnemonic[4..].parse().unwrap_or(1);
            let len = state.stack.len();
            if n >= 1 && len >= n + 1 {
                state.stack.swap(len - 1, len - 1 - n);
            }
            // Shallow: no-op, per spec.
        }
        _ if ins.mnemonic.starts_with("0x") => {
            // Raw, unassigned byte: approximate by popping one slot.
            state.pop();
        }
        _ => {
            for _ in 0..ins.arity.stack_in {
                state.pop();
            }
            for _ in 0..ins.arity.stack_out {
                state.push(StackExpression::Unknown);
            }
        }
    }
}
