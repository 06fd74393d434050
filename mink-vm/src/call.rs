//! Call frames.
//!
//! A [`CallState`] is one activation record: the register file with its
//! collector mirror, the operand stack, the bound closure, the program
//! counter, the flag register, and the native debug descriptor. The fields
//! the interpreter mutates on every instruction live behind the frame's body
//! lock, which the executing fiber holds for the duration of the frame;
//! stack walkers read only the lock-free parts (closure, pc, debug info).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use mink_asm::reg::{
    is_reserved, REG_ALWAYS_NIL, REG_CURRENT, REG_ENV, VM_REGISTER_GENERAL_COUNT,
};
use mink_asm::{Flags, RegisterId};

use crate::closure::Closure;
use crate::consts::VM_STACK_SIZE;
use crate::coroutine::CoroutineInner;
use crate::error::Fault;
use crate::heap::{Heap, ObjectRef};
use crate::sync::lock;
use crate::value::Value;

/// Debug descriptor native code can attach to its frame.
#[derive(Debug, Clone, Default)]
pub struct NativeDebugInfo {
    /// Host source file.
    pub source: Option<String>,
    /// Host function name.
    pub func_name: Option<String>,
    /// Host source line.
    pub line: Option<u32>,
}

/// Register access failure, converted by the interpreter into an
/// `IllegalInstruction` fault carrying the offending word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegAccess {
    OutOfRange(RegisterId),
    ReservedWrite(RegisterId),
    ReservedRead(RegisterId),
}

pub(crate) struct CallBody {
    registers: Vec<Value>,
    gc_registers: Vec<Option<ObjectRef>>,
    stack: Vec<Value>,
    gc_stack: Vec<Option<ObjectRef>>,
    flags: Flags,
}

impl CallBody {
    /// Read a register through the typed reserved-index accessors.
    pub(crate) fn register(&self, closure: &Closure, index: RegisterId) -> Result<Value, RegAccess> {
        if (index as usize) < VM_REGISTER_GENERAL_COUNT {
            return self
                .registers
                .get(index as usize)
                .cloned()
                .ok_or(RegAccess::OutOfRange(index));
        }
        match index {
            REG_ENV => Ok(closure.env().clone()),
            REG_CURRENT => Ok(closure.as_value()),
            REG_ALWAYS_NIL => Ok(Value::Nil),
            _ if is_reserved(index) => Err(RegAccess::ReservedRead(index)),
            _ => Err(RegAccess::OutOfRange(index)),
        }
    }

    /// Write a register; the collector mirror is updated through the write
    /// barrier. Writes to `REG_ALWAYS_NIL` are dropped, all other reserved
    /// indices are rejected.
    pub(crate) fn set_register(
        &mut self,
        heap: &Heap,
        index: RegisterId,
        value: Value,
    ) -> Result<(), RegAccess> {
        if (index as usize) < VM_REGISTER_GENERAL_COUNT {
            if (index as usize) >= self.registers.len() {
                return Err(RegAccess::OutOfRange(index));
            }
            heap.write_slot(&mut self.gc_registers, index as usize, &value);
            self.registers[index as usize] = value;
            return Ok(());
        }
        if index == REG_ALWAYS_NIL {
            return Ok(());
        }
        if is_reserved(index) {
            Err(RegAccess::ReservedWrite(index))
        } else {
            Err(RegAccess::OutOfRange(index))
        }
    }

    /// Next free stack slot (`sp`).
    pub(crate) fn top(&self) -> usize {
        self.stack.len()
    }

    /// Borrow the slot at absolute index `index`.
    pub(crate) fn peek_at(&self, index: usize) -> Option<&Value> {
        self.stack.get(index)
    }

    pub(crate) fn push(&mut self, heap: &Heap, value: Value) -> Result<(), Fault> {
        if self.stack.len() >= VM_STACK_SIZE {
            return Err(Fault::StackOverflow);
        }
        self.stack
            .try_reserve(1)
            .map_err(|_| Fault::OutOfMemory)?;
        self.gc_stack
            .try_reserve(1)
            .map_err(|_| Fault::OutOfMemory)?;
        heap.write_slot(&mut self.gc_stack, self.stack.len(), &value);
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self, heap: &Heap) -> Result<Value, Fault> {
        let value = self.stack.pop().ok_or(Fault::StackUnderflow)?;
        heap.clear_slot(&mut self.gc_stack, self.stack.len());
        Ok(value)
    }

    /// Overwrite the slot at absolute index `index`.
    pub(crate) fn set_slot(
        &mut self,
        heap: &Heap,
        index: usize,
        value: Value,
    ) -> Result<(), Fault> {
        if index >= self.stack.len() {
            return Err(Fault::InvalidStackIndex(index as i64));
        }
        heap.write_slot(&mut self.gc_stack, index, &value);
        self.stack[index] = value;
        Ok(())
    }

    /// Remove `count` slots starting at absolute index `start`, shifting
    /// the slots above down.
    pub(crate) fn remove(&mut self, heap: &Heap, start: usize, count: usize) -> Result<(), Fault> {
        let end = start
            .checked_add(count)
            .ok_or(Fault::InvalidStackIndex(start as i64))?;
        if end > self.stack.len() {
            return Err(Fault::InvalidStackIndex(start as i64));
        }
        self.stack.drain(start..end);
        for index in (self.stack.len()..self.stack.len() + count).rev() {
            heap.clear_slot(&mut self.gc_stack, index);
        }
        for index in start..self.stack.len() {
            let value = self.stack[index].clone();
            heap.write_slot(&mut self.gc_stack, index, &value);
        }
        Ok(())
    }

    /// Copy of the top `count` slots, oldest first.
    pub(crate) fn top_slice(&self, count: usize) -> Vec<Value> {
        let start = self.stack.len().saturating_sub(count);
        self.stack[start..].to_vec()
    }

    pub(crate) fn flags(&self) -> Flags {
        self.flags
    }

    pub(crate) fn set_flags(&mut self, flags: Flags) {
        self.flags = flags;
    }
}

struct CallStateInner {
    closure: Closure,
    owner: Weak<CoroutineInner>,
    pc: AtomicUsize,
    debug: Mutex<NativeDebugInfo>,
    body: Mutex<CallBody>,
}

/// Shared handle to one activation record.
#[derive(Clone)]
pub struct CallState(Arc<CallStateInner>);

impl CallState {
    /// Allocate a frame for `closure`. Interpreted frames get a register
    /// file; native frames carry only an operand stack.
    pub(crate) fn new(
        heap: &Heap,
        closure: Closure,
        owner: Weak<CoroutineInner>,
    ) -> Result<CallState, Fault> {
        let (registers, gc_registers) = if closure.is_native() {
            (Vec::new(), Vec::new())
        } else {
            (
                heap.alloc_slots(VM_REGISTER_GENERAL_COUNT)?,
                heap.alloc_mirror(VM_REGISTER_GENERAL_COUNT)?,
            )
        };
        Ok(CallState(Arc::new(CallStateInner {
            closure,
            owner,
            pc: AtomicUsize::new(0),
            debug: Mutex::new(NativeDebugInfo::default()),
            body: Mutex::new(CallBody {
                registers,
                gc_registers,
                stack: Vec::new(),
                gc_stack: Vec::new(),
                flags: Flags::empty(),
            }),
        })))
    }

    /// The bound closure.
    pub fn closure(&self) -> &Closure {
        &self.0.closure
    }

    /// The owning coroutine, if still alive.
    pub(crate) fn owner(&self) -> Weak<CoroutineInner> {
        self.0.owner.clone()
    }

    /// Current program counter.
    pub fn pc(&self) -> usize {
        self.0.pc.load(Ordering::Relaxed)
    }

    pub(crate) fn set_pc(&self, pc: usize) {
        self.0.pc.store(pc, Ordering::Relaxed);
    }

    /// Attach a native debug descriptor to the frame.
    pub fn set_debug_info(&self, info: NativeDebugInfo) {
        *lock(&self.0.debug) = info;
    }

    /// Snapshot of the native debug descriptor.
    pub fn debug_info(&self) -> NativeDebugInfo {
        lock(&self.0.debug).clone()
    }

    /// Operand-stack height, as visible to walkers between instructions.
    pub fn stack_top(&self) -> usize {
        lock(&self.0.body).top()
    }

    pub(crate) fn lock_body(&self) -> MutexGuard<'_, CallBody> {
        lock(&self.0.body)
    }

    pub(crate) fn ptr_eq(&self, other: &CallState) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallState")
            .field("closure", self.closure())
            .field("pc", &self.pc())
            .finish()
    }
}
