use core::fmt;

use crate::{Flags, Opcode, RawInstruction};

/// Conditional execution prefix of an instruction.
///
/// The high nibble is a mask over the flag register, the low nibble a
/// pattern: the instruction executes iff `(flags & mask) == (pattern & mask)`.
/// A zero mask means "always".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CondCode(u8);

impl CondCode {
    /// Unconditional execution.
    pub const ALWAYS: CondCode = CondCode(0);

    /// Build a condition from a flag mask and a pattern; only the low nibble
    /// of each is significant.
    pub const fn new(mask: u8, pattern: u8) -> Self {
        CondCode(((mask & 0x0f) << 4) | (pattern & 0x0f))
    }

    /// Condition requiring the given flags to be set.
    pub const fn if_set(flags: Flags) -> Self {
        CondCode::new(flags.bits(), flags.bits())
    }

    /// Condition requiring the given flags to be clear.
    pub const fn if_clear(flags: Flags) -> Self {
        CondCode::new(flags.bits(), 0)
    }

    /// Reconstruct from the raw cond byte of an instruction word.
    pub const fn from_byte(byte: u8) -> Self {
        CondCode(byte)
    }

    /// The raw cond byte.
    pub const fn to_byte(self) -> u8 {
        self.0
    }

    /// Flag mask (high nibble).
    pub const fn mask(self) -> u8 {
        self.0 >> 4
    }

    /// Flag pattern (low nibble).
    pub const fn pattern(self) -> u8 {
        self.0 & 0x0f
    }

    /// Whether the prefix allows execution under the given flag register.
    pub const fn is_satisfied(self, flags: Flags) -> bool {
        flags.bits() & self.mask() == self.pattern() & self.mask()
    }
}

/// A fully decoded instruction: the primary word plus any extension fields.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    op: u8,
    cond: u8,
    a: u16,
    b: u16,
    c: u16,
    d: u16,
    e: u16,
    f: u16,
    g: u16,
    h: u16,
    i: u16,
}

impl Instruction {
    /// Extract the fields of a single raw word; extension fields are zero.
    pub const fn parse(word: RawInstruction) -> Self {
        Instruction {
            op: (word >> 56) as u8,
            cond: (word >> 48) as u8,
            a: (word >> 32) as u16,
            b: (word >> 16) as u16,
            c: word as u16,
            d: 0,
            e: 0,
            f: 0,
            g: 0,
            h: 0,
            i: 0,
        }
    }

    /// Raw opcode byte.
    pub const fn raw_opcode(&self) -> u8 {
        self.op
    }

    /// Conditional prefix.
    pub const fn cond(&self) -> CondCode {
        CondCode::from_byte(self.cond)
    }

    /// Field `A`.
    pub const fn a(&self) -> u16 {
        self.a
    }

    /// Field `B`.
    pub const fn b(&self) -> u16 {
        self.b
    }

    /// Field `C`.
    pub const fn c(&self) -> u16 {
        self.c
    }

    /// Field `D` (first extension word).
    pub const fn d(&self) -> u16 {
        self.d
    }

    /// Field `E` (first extension word).
    pub const fn e(&self) -> u16 {
        self.e
    }

    /// Field `F` (first extension word).
    pub const fn f(&self) -> u16 {
        self.f
    }

    /// Field `G` (second extension word).
    pub const fn g(&self) -> u16 {
        self.g
    }

    /// Field `H` (second extension word).
    pub const fn h(&self) -> u16 {
        self.h
    }

    /// Field `I` (second extension word).
    pub const fn i(&self) -> u16 {
        self.i
    }
}

/// Result of decoding one logical instruction from an instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// The instruction with all operand fields populated.
    pub instruction: Instruction,
    /// The resolved primary opcode.
    pub opcode: Opcode,
    /// Number of words consumed, including extension words.
    pub width: usize,
}

/// Decode failure; every variant carries the offending raw word so
/// diagnostics can print it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeError {
    /// The opcode byte of the primary word is unassigned.
    UnknownOpcode(RawInstruction),
    /// An extension word was fetched as a primary opcode.
    ExtensionAsPrimary(RawInstruction),
    /// The opcode requires extension words beyond the end of the stream.
    Truncated(RawInstruction),
    /// A required extension word does not carry the `EXTRA` opcode.
    MissingExtension(RawInstruction),
}

impl DecodeError {
    /// The raw word that made the decoder fail.
    pub const fn word(&self) -> RawInstruction {
        match self {
            DecodeError::UnknownOpcode(w)
            | DecodeError::ExtensionAsPrimary(w)
            | DecodeError::Truncated(w)
            | DecodeError::MissingExtension(w) => *w,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownOpcode(w) => write!(f, "unknown opcode in {w:016x}"),
            DecodeError::ExtensionAsPrimary(w) => {
                write!(f, "extension word fetched as instruction {w:016x}")
            }
            DecodeError::Truncated(w) => {
                write!(f, "truncated instruction {w:016x}")
            }
            DecodeError::MissingExtension(w) => {
                write!(f, "expected extension word, found {w:016x}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl Instruction {
    /// Decode one logical instruction from the head of `words`, consuming
    /// the extension words its opcode requires.
    pub fn decode(words: &[RawInstruction]) -> Result<Decoded, DecodeError> {
        let Some(&head) = words.first() else {
            return Err(DecodeError::Truncated(0));
        };

        let mut instruction = Instruction::parse(head);
        let opcode = Opcode::try_from(instruction.op)
            .map_err(|_| DecodeError::UnknownOpcode(head))?;
        if opcode == Opcode::Extra {
            return Err(DecodeError::ExtensionAsPrimary(head));
        }

        let width = opcode.width();
        if words.len() < width {
            return Err(DecodeError::Truncated(head));
        }

        for (index, &word) in words[1..width].iter().enumerate() {
            let extension = Instruction::parse(word);
            if extension.op != Opcode::Extra as u8 {
                return Err(DecodeError::MissingExtension(word));
            }
            match index {
                0 => {
                    instruction.d = extension.a;
                    instruction.e = extension.b;
                    instruction.f = extension.c;
                }
                _ => {
                    instruction.g = extension.a;
                    instruction.h = extension.b;
                    instruction.i = extension.c;
                }
            }
        }

        Ok(Decoded {
            instruction,
            opcode,
            width,
        })
    }
}
