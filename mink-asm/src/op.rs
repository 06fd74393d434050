//! Constructor helpers for assembling instruction streams.
//!
//! These produce raw words directly so programs for tests and hosts can be
//! written as flat arrays:
//!
//! ```
//! use mink_asm::op;
//!
//! let program = [
//!     op::get_constant(0, 0),
//!     op::get_constant(1, 1),
//!     op::add(2, 0, 1),
//!     op::stack_push(2),
//!     op::ret(2, 1),
//! ];
//! # let _ = program;
//! ```

use crate::{CondCode, Opcode, RawInstruction, RegisterId};

const fn pack(op: Opcode, a: u16, b: u16, c: u16) -> RawInstruction {
    ((op as u64) << 56) | ((a as u64) << 32) | ((b as u64) << 16) | (c as u64)
}

/// Attach a conditional prefix to an assembled word.
pub const fn when(cond: CondCode, word: RawInstruction) -> RawInstruction {
    (word & !(0xff << 48)) | ((cond.to_byte() as u64) << 48)
}

/// No operation.
pub const fn nop() -> RawInstruction {
    pack(Opcode::Nop, 0, 0, 0)
}

/// `R[a] = R[b]`
pub const fn mov(a: RegisterId, b: RegisterId) -> RawInstruction {
    pack(Opcode::Mov, a, b, 0)
}

/// `R[a] = R[b] + R[c]`
pub const fn add(a: RegisterId, b: RegisterId, c: RegisterId) -> RawInstruction {
    pack(Opcode::Add, a, b, c)
}

/// `R[a] = R[b] - R[c]`
pub const fn sub(a: RegisterId, b: RegisterId, c: RegisterId) -> RawInstruction {
    pack(Opcode::Sub, a, b, c)
}

/// `R[a] = R[b] * R[c]`
pub const fn mul(a: RegisterId, b: RegisterId, c: RegisterId) -> RawInstruction {
    pack(Opcode::Mul, a, b, c)
}

/// `R[a] = R[b] / R[c]`
pub const fn div(a: RegisterId, b: RegisterId, c: RegisterId) -> RawInstruction {
    pack(Opcode::Div, a, b, c)
}

/// `R[a] = R[b] % R[c]`
pub const fn modulo(a: RegisterId, b: RegisterId, c: RegisterId) -> RawInstruction {
    pack(Opcode::Mod, a, b, c)
}

/// `R[a] = R[b] ^ R[c]`
pub const fn pow(a: RegisterId, b: RegisterId, c: RegisterId) -> RawInstruction {
    pack(Opcode::Pow, a, b, c)
}

/// Set the flag register from `R[a]` vs `R[b]`.
pub const fn cmp(a: RegisterId, b: RegisterId) -> RawInstruction {
    pack(Opcode::Cmp, a, b, 0)
}

/// `pc = pc + offset`
pub const fn jmp_forward(offset: u16) -> RawInstruction {
    pack(Opcode::JmpForward, offset, 0, 0)
}

/// `pc = pc - offset`
pub const fn jmp_backward(offset: u16) -> RawInstruction {
    pack(Opcode::JmpBackward, offset, 0, 0)
}

/// `R[a] =` closure over child prototype `index`.
pub const fn load_prototype(a: RegisterId, index: u16) -> RawInstruction {
    pack(Opcode::LoadPrototype, a, index, 0)
}

/// `R[a] = constants[index]`
pub const fn get_constant(a: RegisterId, index: u16) -> RawInstruction {
    pack(Opcode::GetConstant, a, index, 0)
}

/// `R[a] = Long(sp - 1)`
pub const fn stack_gettop(a: RegisterId) -> RawInstruction {
    pack(Opcode::StackGetTop, a, 0, 0)
}

/// `stack[sp++] = R[a]`
pub const fn stack_push(a: RegisterId) -> RawInstruction {
    pack(Opcode::StackPush, a, 0, 0)
}

/// `R[a] = stack[--sp]`
pub const fn stack_pop(a: RegisterId) -> RawInstruction {
    pack(Opcode::StackPop, a, 0, 0)
}

/// `R[a] = R[b][R[c]]`
pub const fn table_get(a: RegisterId, b: RegisterId, c: RegisterId) -> RawInstruction {
    pack(Opcode::TableGet, a, b, c)
}

/// `R[a][R[b]] = R[c]`
pub const fn table_set(a: RegisterId, b: RegisterId, c: RegisterId) -> RawInstruction {
    pack(Opcode::TableSet, a, b, c)
}

/// Invoke `R[a]`; see [`Opcode::Call`] for the `b`/`c` arity encodings.
pub const fn call(a: RegisterId, b: u16, c: u16) -> RawInstruction {
    pack(Opcode::Call, a, b, c)
}

/// Push `R[a] .. R[a + b - 1]` and exit the frame.
pub const fn ret(a: RegisterId, b: u16) -> RawInstruction {
    pack(Opcode::Return, a, b, 0)
}

/// Extension word carrying three additional operand fields.
pub const fn extra(d: u16, e: u16, f: u16) -> RawInstruction {
    pack(Opcode::Extra, d, e, f)
}
