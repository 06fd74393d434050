//! VM parameters.

pub use mink_asm::reg::{
    REG_ALWAYS_NIL, REG_CURRENT, REG_ENV, VM_REGISTER_COUNT, VM_REGISTER_GENERAL_COUNT,
    VM_REGISTER_RESERVED_COUNT,
};

/// Capacity of the per-frame operand stack, in value slots.
pub const VM_STACK_SIZE: usize = 1024;

/// Maximum call-frame depth of a coroutine.
pub const VM_CALL_DEPTH: usize = 256;

/// Byte size of the dedicated stack backing a coroutine fiber.
pub const FIBER_STACK_SIZE: usize = 1024 * 1024;

/// Default capacity hint for newly created tables.
pub const TABLE_DEFAULT_CAPACITY: usize = 8;
