//! Register file layout.
//!
//! General-purpose registers occupy the low indices so programs address
//! `R0..` naturally; the reserved block sits at the top of the file.

use crate::RegisterId;

/// Total size of the register file of a call frame.
pub const VM_REGISTER_COUNT: usize = 256;

/// Size of the reserved block at the top of the register file.
pub const VM_REGISTER_RESERVED_COUNT: usize = 16;

/// Number of general-purpose (writable) registers.
pub const VM_REGISTER_GENERAL_COUNT: usize = VM_REGISTER_COUNT - VM_REGISTER_RESERVED_COUNT;

/// Read-only view of the current closure's environment.
pub const REG_ENV: RegisterId = VM_REGISTER_GENERAL_COUNT as RegisterId;

/// Read-only view of the current closure as a value.
pub const REG_CURRENT: RegisterId = REG_ENV + 1;

/// Always reads nil; writes are silently dropped.
pub const REG_ALWAYS_NIL: RegisterId = REG_ENV + 2;

/// Whether the index addresses the reserved block.
pub const fn is_reserved(register: RegisterId) -> bool {
    register as usize >= VM_REGISTER_GENERAL_COUNT && (register as usize) < VM_REGISTER_COUNT
}

/// Whether the index addresses the register file at all.
pub const fn is_valid(register: RegisterId) -> bool {
    (register as usize) < VM_REGISTER_COUNT
}
