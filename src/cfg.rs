//! Basic-block partitioning and the control-flow graph built over them.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::disassembler::Instruction;

/// A maximal straight-line run of instructions, identified by its leader PC.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub leader: usize,
    pub start_pc: usize,
    pub end_pc: usize,
    pub instructions: Vec<Instruction>,
    pub successors: HashSet<usize>,
    pub predecessors: HashSet<usize>,
}

/// Mapping from leader PC to owned block, plus the designated entry block.
///
/// Backed by an `IndexMap` rather than a `HashMap` so iteration order
/// follows insertion order (ascending leader PC), which keeps debug output
/// and graph-building deterministic without a separate sort.
pub struct ControlFlowGraph {
    pub blocks: IndexMap<usize, BasicBlock>,
    pub entry: Option<usize>,
}

impl ControlFlowGraph {
    pub fn build(instructions: &[Instruction]) -> Self {
        if instructions.is_empty() {
            return ControlFlowGraph {
                blocks: IndexMap::new(),
                entry: None,
            };
        }

        let leaders = find_leaders(instructions);
        let mut sorted: Vec<usize> = leaders.into_iter().collect();
        sorted.sort_unstable();

        // Map each instruction's pc to its index, so block slicing by index
        // is exact even though pcs are not contiguous (pushes advance by N+1).
        let pc_to_index: HashMap<usize, usize> = instructions
            .iter()
            .enumerate()
            .map(|(i, ins)| (ins.pc, i))
            .collect();

        let mut blocks = IndexMap::new();
        for (i, &leader_pc) in sorted.iter().enumerate() {
            let start_idx = pc_to_index[&leader_pc];
            let end_idx = if i + 1 < sorted.len() {
                pc_to_index[&sorted[i + 1]]
            } else {
                instructions.len()
            };
            let block_instructions = instructions[start_idx..end_idx].to_vec();
            let start_pc = block_instructions.first().map(|i| i.pc).unwrap_or(leader_pc);
            let end_pc = block_instructions.last().map(|i| i.pc).unwrap_or(leader_pc);

            blocks.insert(
                leader_pc,
                BasicBlock {
                    leader: leader_pc,
                    start_pc,
                    end_pc,
                    instructions: block_instructions,
                    successors: HashSet::new(),
                    predecessors: HashSet::new(),
                },
            );
        }

        let mut cfg = ControlFlowGraph {
            blocks,
            entry: if sorted.first() == Some(&0) {
                Some(0)
            } else {
                None
            },
        };

        link_edges(&mut cfg, &sorted);
        cfg
    }

    pub fn block_containing(&self, pc: usize) -> Option<&BasicBlock> {
        self.blocks
            .values()
            .find(|b| b.start_pc <= pc && pc <= b.end_pc)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

fn find_leaders(instructions: &[Instruction]) -> HashSet<usize> {
    let mut leaders = HashSet::new();
    leaders.insert(instructions[0].pc);

    for (i, ins) in instructions.iter().enumerate() {
        if ins.mnemonic == "JUMPDEST" {
            leaders.insert(ins.pc);
        }
        if ins.is_terminator() {
            if let Some(next) = instructions.get(i + 1) {
                leaders.insert(next.pc);
            }
        }
    }

    leaders
}

fn link_edges(cfg: &mut ControlFlowGraph, sorted_leaders: &[usize]) {
    let next_leader: HashMap<usize, usize> = sorted_leaders
        .windows(2)
        .map(|w| (w[0], w[1]))
        .collect();

    let mut succ_updates: Vec<(usize, usize)> = Vec::new();

    for &leader in sorted_leaders {
        let block = &cfg.blocks[&leader];
        let last = match block.instructions.last() {
            Some(i) => i,
            None => continue,
        };

        let fallthrough_target = next_leader.get(&leader).copied();

        match last.mnemonic.as_str() {
            "JUMP" => {}
            "JUMPI" => {
                if let Some(target) = fallthrough_target {
                    succ_updates.push((leader, target));
                }
            }
            "STOP" | "RETURN" | "REVERT" | "SELFDESTRUCT" => {}
            _ => {
                if let Some(target) = fallthrough_target {
                    succ_updates.push((leader, target));
                }
            }
        }
    }

    for (from, to) in succ_updates {
        cfg.blocks.get_mut(&from).unwrap().successors.insert(to);
        cfg.blocks.get_mut(&to).unwrap().predecessors.insert(from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::Disassembler;

    #[test]
    fn single_block_for_straight_line_code() {
        let ins = Disassembler::disassemble(&[0x00]); // STOP
        let cfg = ControlFlowGraph::build(&ins);
        assert_eq!(cfg.block_count(), 1);
        assert_eq!(cfg.entry, Some(0));
    }

    #[test]
    fn jump_has_no_successors() {
        // PUSH1 0x04, JUMP, JUMPDEST, STOP
        let ins = Disassembler::disassemble(&[0x60, 0x04, 0x56, 0x5b, 0x00]);
        let cfg = ControlFlowGraph::build(&ins);
        assert_eq!(cfg.block_count(), 2);
        let entry = &cfg.blocks[&0];
        assert!(entry.successors.is_empty());
        let jumpdest_block = &cfg.blocks[&3];
        assert!(jumpdest_block.predecessors.is_empty());
    }

    #[test]
    fn jumpi_has_fallthrough_edge() {
        // PUSH1 0, PUSH1 8, JUMPI, PUSH1 1, STOP, JUMPDEST, STOP
        let ins = Disassembler::disassemble(&[
            0x60, 0x00, 0x60, 0x08, 0x57, 0x60, 0x01, 0x00, 0x5b, 0x00,
        ]);
        let cfg = ControlFlowGraph::build(&ins);
        // Leaders: 0 (entry), 5 (after JUMPI), 8 (JUMPDEST)
        assert_eq!(cfg.block_count(), 3);
        let first = &cfg.blocks[&0];
        assert!(first.successors.contains(&5));
        assert!(!first.successors.contains(&8));
    }

    #[test]
    fn predecessor_successor_mirror_invariant() {
        let ins = Disassembler::disassemble(&[
            0x60, 0x00, 0x60, 0x08, 0x57, 0x60, 0x01, 0x00, 0x5b, 0x00,
        ]);
        let cfg = ControlFlowGraph::build(&ins);
        for block in cfg.blocks.values() {
            for &succ in &block.successors {
                assert!(cfg.blocks[&succ].predecessors.contains(&block.leader));
            }
        }
    }

    #[test]
    fn empty_bytecode_has_no_entry() {
        let ins = Disassembler::disassemble(&[]);
        let cfg = ControlFlowGraph::build(&ins);
        assert_eq!(cfg.block_count(), 0);
        assert!(cfg.entry.is_none());
    }
}
