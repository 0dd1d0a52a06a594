//! Turns a hex-encoded bytecode string into an ordered instruction stream.

use crate::error::{AnalyzerError, Result};
use crate::opcode::{self, Arity};

/// A single decoded instruction.
///
/// `pc` is the byte offset of the opcode itself (the corrected convention
/// from the design notes, not the reference implementation's post-advance
/// offset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub pc: usize,
    pub mnemonic: String,
    /// Hex-encoded (with `0x` prefix) push immediate, when this is a PUSH-N.
    pub immediate: Option<String>,
    pub arity: Arity,
}

impl Instruction {
    pub fn is_push(&self) -> bool {
        self.immediate.is_some()
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self.mnemonic.as_str(),
            "STOP" | "RETURN" | "REVERT" | "SELFDESTRUCT" | "JUMP" | "JUMPI"
        )
    }
}

/// Strip an optional `0x` prefix and decode a hex string into bytes.
///
/// Odd-length input or non-hex characters are malformed.
pub fn decode_hex(input: &str) -> Result<Vec<u8>> {
    let stripped = input.strip_prefix("0x").unwrap_or(input);
    if stripped.len() % 2 != 0 {
        return Err(AnalyzerError::MalformedBytecode(
            "odd-length hex string".to_string(),
        ));
    }
    let mut bytes = Vec::with_capacity(stripped.len() / 2);
    let chars: Vec<char> = stripped.chars().collect();
    for chunk in chars.chunks(2) {
        let s: String = chunk.iter().collect();
        let byte = u8::from_str_radix(&s, 16)
            .map_err(|e| AnalyzerError::MalformedBytecode(e.to_string()))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

pub struct Disassembler;

impl Disassembler {
    /// Disassemble a hex string (with or without `0x`) into instructions.
    pub fn disassemble_hex(input: &str) -> Result<Vec<Instruction>> {
        let bytes = decode_hex(input)?;
        Ok(Self::disassemble(&bytes))
    }

    /// Disassemble a raw byte slice into instructions. Never fails: unknown
    /// bytes become raw-byte placeholders rather than errors.
    pub fn disassemble(bytecode: &[u8]) -> Vec<Instruction> {
        let mut instructions = Vec::new();
        let mut pc = 0usize;

        while pc < bytecode.len() {
            let byte = bytecode[pc];

            if let Some(n) = opcode::push_size(byte) {
                let n = n as usize;
                let available = bytecode.len().saturating_sub(pc + 1);
                let take = n.min(available);
                let mut payload = bytecode[pc + 1..pc + 1 + take].to_vec();
                // Truncated PUSH at end-of-code: zero-pad the missing tail.
                payload.resize(n, 0);

                let (name, arity) = opcode::mnemonic(byte).expect("push byte has an entry");
                instructions.push(Instruction {
                    pc,
                    mnemonic: name.to_string(),
                    immediate: Some(format!("0x{}", hex::encode(&payload))),
                    arity,
                });
                pc += 1 + n;
                continue;
            }

            match opcode::mnemonic(byte) {
                Some((name, arity)) => {
                    instructions.push(Instruction {
                        pc,
                        mnemonic: name.to_string(),
                        immediate: None,
                        arity,
                    });
                }
                None => {
                    instructions.push(Instruction {
                        pc,
                        mnemonic: format!("0x{:02x}", byte),
                        immediate: None,
                        arity: Arity {
                            stack_in: 0,
                            stack_out: 0,
                        },
                    });
                }
            }
            pc += 1;
        }

        instructions
    }
}
