use core::fmt;

/// Operation code of an instruction word.
///
/// The discriminant is the opcode byte as it appears in the high byte of the
/// instruction word. `Extra` marks extension words and is never valid as a
/// primary opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Opcode {
    /// No operation.
    Nop = 0x00,
    /// `R[A] = R[B]`
    Mov = 0x01,
    /// `R[A] = R[B] + R[C]`
    Add = 0x02,
    /// `R[A] = R[B] - R[C]`
    Sub = 0x03,
    /// `R[A] = R[B] * R[C]`
    Mul = 0x04,
    /// `R[A] = R[B] / R[C]`
    Div = 0x05,
    /// `R[A] = R[B] % R[C]`
    Mod = 0x06,
    /// `R[A] = R[B] ^ R[C]` (exponentiation, always a double)
    Pow = 0x07,
    /// Set the `EQUAL`/`LESS` flags from `R[A]` vs `R[B]`.
    Cmp = 0x08,
    /// `pc = pc + A`
    JmpForward = 0x09,
    /// `pc = pc - A`
    JmpBackward = 0x0a,
    /// `R[A] =` new closure over child prototype `B` with the current
    /// environment.
    LoadPrototype = 0x0b,
    /// `R[A] = constants[B]`
    GetConstant = 0x0c,
    /// `R[A] = Long(sp - 1)`
    StackGetTop = 0x0d,
    /// `stack[sp++] = R[A]`
    StackPush = 0x0e,
    /// `R[A] = stack[--sp]`
    StackPop = 0x0f,
    /// `R[A] = R[B][R[C]]`; an absent key yields nil.
    TableGet = 0x10,
    /// `R[A][R[B]] = R[C]`
    TableSet = 0x11,
    /// Invoke `R[A]` with `C - 1` arguments (`C = 1`: all remaining stack
    /// slots) expecting `B - 1` results (`B = 1`: all produced).
    Call = 0x12,
    /// Push `R[A] .. R[A + B - 1]` and exit the frame.
    Return = 0x13,
    /// Extension word carrying additional operand fields. Fatal when fetched
    /// as a primary opcode.
    Extra = 0xff,
}

impl Opcode {
    /// Number of 16-bit operand fields the opcode uses, counting extension
    /// words.
    pub const fn fields(self) -> usize {
        match self {
            Opcode::Nop => 0,
            Opcode::JmpForward
            | Opcode::JmpBackward
            | Opcode::StackGetTop
            | Opcode::StackPush
            | Opcode::StackPop => 1,
            Opcode::Mov
            | Opcode::Cmp
            | Opcode::LoadPrototype
            | Opcode::GetConstant
            | Opcode::Return => 2,
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Pow
            | Opcode::TableGet
            | Opcode::TableSet
            | Opcode::Call
            | Opcode::Extra => 3,
        }
    }

    /// Total number of instruction words the opcode occupies: the primary
    /// word plus the extension words needed for fields beyond `C`.
    pub const fn width(self) -> usize {
        let fields = self.fields();
        if fields <= 3 {
            1
        } else {
            (fields + 2) / 3
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcode;

    fn try_from(byte: u8) -> Result<Self, InvalidOpcode> {
        use Opcode::*;
        Ok(match byte {
            0x00 => Nop,
            0x01 => Mov,
            0x02 => Add,
            0x03 => Sub,
            0x04 => Mul,
            0x05 => Div,
            0x06 => Mod,
            0x07 => Pow,
            0x08 => Cmp,
            0x09 => JmpForward,
            0x0a => JmpBackward,
            0x0b => LoadPrototype,
            0x0c => GetConstant,
            0x0d => StackGetTop,
            0x0e => StackPush,
            0x0f => StackPop,
            0x10 => TableGet,
            0x11 => TableSet,
            0x12 => Call,
            0x13 => Return,
            0xff => Extra,
            _ => return Err(InvalidOpcode(byte)),
        })
    }
}

/// The byte does not map to any known [`Opcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvalidOpcode(pub u8);

impl fmt::Display for InvalidOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid opcode byte 0x{:02x}", self.0)
    }
}

impl std::error::Error for InvalidOpcode {}
