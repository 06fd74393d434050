//! Instruction set of the Mink VM.
//!
//! A Mink instruction is a 64-bit word laid out as
//! `opcode:8 | cond:8 | A:16 | B:16 | C:16`. Opcodes whose operand list does
//! not fit in three 16-bit fields consume one or two following words whose
//! opcode byte must be [`Opcode::Extra`]; those supply the fields `D`, `E`,
//! `F` and optionally `G`, `H`, `I`. The total word width of an opcode is
//! fixed by its field count ([`Opcode::width`]).

#![warn(missing_docs)]

mod flags;
mod instruction;
mod opcode;

pub mod op;
pub mod reg;


pub use flags::Flags;
pub use instruction::{CondCode, DecodeError, Decoded, Instruction};
pub use opcode::{InvalidOpcode, Opcode};

/// Register identifier as encoded in an instruction field.
pub type RegisterId = u16;

/// A single raw instruction word.
pub type RawInstruction = u64;

/// Register-sized word of the target machine.
pub type Word = u64;
