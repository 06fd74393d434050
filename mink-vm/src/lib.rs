//! Mink VM, an embeddable virtual machine for a dynamically typed bytecode
//! dialect.
//!
//! Hosts load precompiled bytecode ([`ProgramImage`]), instantiate it against
//! a [`Vm`], wrap prototypes into [`Closure`]s, and either call them directly
//! on the main thread or [`spawn`](Vm::spawn_coroutine) them as cooperative
//! [`Coroutine`]s that suspend with [`Vm::yield_values`] and continue with
//! [`Coroutine::resume`]. Failures propagate as [`VmError`] up to the nearest
//! protected call ([`Vm::protected_call`]), which restores the frame stack to
//! its pre-call depth.

#![warn(missing_docs)]

pub mod api;
pub mod backtrace;
pub mod consts;

mod bytecode;
mod call;
mod closure;
mod coroutine;
mod error;
mod fiber;
mod heap;
mod interpreter;
mod state;
mod strings;
mod sync;
mod table;
mod userdata;
mod value;
mod vm;

pub use bytecode::{ConstantImage, LoadError, Program, ProgramImage, Prototype, PrototypeImage};
pub use call::{CallState, NativeDebugInfo};
pub use closure::{Closure, NativeData, NativeFn};
pub use coroutine::Coroutine;
pub use error::{CoroutineFault, Fault, VmError, VmResult};
pub use fiber::FiberState;
pub use heap::{DescriptorId, Heap, ObjectRef, RootRef};
pub use state::ResumeResult;
pub use strings::VmString;
pub use table::{Table, TableRef};
pub use userdata::{GcObject, LightUserdata, UserdataFinalizer, UserdataRef};
pub use value::{ArithOp, Integer, Number, Value};
pub use vm::Vm;
