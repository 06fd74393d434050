//! Host-facing stack API.
//!
//! A thin façade over the core, in the style of a scripting C API: values
//! move through the current frame's operand stack, addressed by 1-based
//! absolute indices, negative from-the-top indices, or pseudo-indices.
//! Exposing this surface does not change core semantics.

use crate::call::CallState;
use crate::consts::VM_STACK_SIZE;
use crate::coroutine::Coroutine;
use crate::error::{Fault, VmError, VmResult};
use crate::strings::VmString;
use crate::value::Value;
use crate::vm::Vm;

/// Pseudo-indices carry the 32nd bit; the remaining bits select the
/// pseudo-location. The slot space is kept tiny so pseudo-indices can never
/// collide with negative from-the-top indices.
pub const PSEUDO_INDEX_BIT: u32 = 0x8000_0000;

const PSEUDO_SLOT_MASK: u32 = 0x0000_0fff;

/// Pseudo-index of the registry table.
pub const REGISTRY_INDEX: i32 = (PSEUDO_INDEX_BIT | 1) as i32;

/// Whether `index` denotes a pseudo-location.
pub const fn is_pseudo_index(index: i32) -> bool {
    (index as u32) & PSEUDO_INDEX_BIT != 0 && (index as u32) & !PSEUDO_INDEX_BIT <= PSEUDO_SLOT_MASK
}

/// Status codes observed by the host. The core emits `Ok`, `Yield`,
/// `RuntimeError`, and `MemoryError`; the remaining codes belong to outer
/// layers (loaders, handlers) and are defined here for ABI completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// Success.
    Ok = 0,
    /// The coroutine suspended.
    Yield = 1,
    /// Runtime error.
    RuntimeError = 2,
    /// Syntax error in a loaded chunk.
    SyntaxError = 3,
    /// Allocator refusal.
    MemoryError = 4,
    /// Error while running the message handler.
    HandlerError = 5,
    /// File access error.
    FileError = 6,
}

impl Status {
    /// Map an engine error to its host status code.
    pub fn from_error(error: &VmError) -> Status {
        match error.fault() {
            Some(Fault::OutOfMemory) => Status::MemoryError,
            _ => Status::RuntimeError,
        }
    }

    /// The numeric code.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Host-visible type tag of a stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Nil.
    Nil,
    /// Boolean.
    Bool,
    /// Long or double.
    Number,
    /// Byte string.
    String,
    /// Table.
    Table,
    /// Callable.
    Function,
    /// Any userdata flavor.
    Userdata,
    /// Coroutine.
    Coroutine,
}

impl ValueType {
    /// Host-visible name of the type tag.
    pub const fn name(self) -> &'static str {
        match self {
            ValueType::Nil => "nil",
            ValueType::Bool => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Table => "table",
            ValueType::Function => "function",
            ValueType::Userdata => "userdata",
            ValueType::Coroutine => "coroutine",
        }
    }

    fn of(value: &Value) -> ValueType {
        match value {
            Value::Nil => ValueType::Nil,
            Value::Bool(_) => ValueType::Bool,
            Value::Long(_) | Value::Double(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Table(_) => ValueType::Table,
            Value::Closure(_) => ValueType::Function,
            Value::Coroutine(_) => ValueType::Coroutine,
            Value::FullUserdata(_) | Value::LightUserdata(_) | Value::GcUserdata(_) => {
                ValueType::Userdata
            }
        }
    }
}

/// Stack operations bound to one coroutine, the way a C API state handle
/// binds to one thread.
pub struct Stack<'vm> {
    vm: &'vm Vm,
    co: Coroutine,
}

impl Vm {
    /// Stack operations on the main thread.
    pub fn stack(&self) -> Stack<'_> {
        Stack {
            vm: self,
            co: self.main_thread(),
        }
    }

    /// Stack operations on a specific coroutine.
    pub fn stack_of(&self, co: &Coroutine) -> Stack<'_> {
        Stack {
            vm: self,
            co: co.clone(),
        }
    }
}

impl Stack<'_> {
    fn frame(&self) -> VmResult<CallState> {
        self.co.current_frame().ok_or(Fault::StackUnderflow.into())
    }

    /// Height of the operand stack (`sp`).
    pub fn top(&self) -> usize {
        self.frame().map(|frame| frame.stack_top()).unwrap_or(0)
    }

    /// Convert an acceptable index into a 1-based absolute index.
    /// Pseudo-indices pass through unchanged.
    pub fn abs_index(&self, index: i32) -> VmResult<i32> {
        if is_pseudo_index(index) {
            return Ok(index);
        }
        let top = self.top() as i64;
        let resolved = match i64::from(index) {
            0 => return Err(Fault::InvalidStackIndex(0).into()),
            n if n < 0 => top + n + 1,
            n => n,
        };
        if resolved <= 0 || resolved > top {
            return Err(Fault::InvalidStackIndex(index.into()).into());
        }
        Ok(resolved as i32)
    }

    fn slot(&self, index: i32) -> VmResult<usize> {
        let resolved = self.abs_index(index)?;
        if is_pseudo_index(resolved) {
            return Err(Fault::InvalidStackIndex(resolved.into()).into());
        }
        Ok(resolved as usize - 1)
    }

    /// Read the value at `index`.
    pub fn value_at(&self, index: i32) -> VmResult<Value> {
        if index == REGISTRY_INDEX {
            return Ok(self.vm.registry());
        }
        let slot = self.slot(index)?;
        let frame = self.frame()?;
        let body = frame.lock_body();
        body.peek_at(slot)
            .cloned()
            .ok_or_else(|| Fault::InvalidStackIndex(index.into()).into())
    }

    /// Whether `n` more slots fit on the operand stack.
    pub fn check_capacity(&self, n: usize) -> bool {
        self.top() + n <= VM_STACK_SIZE
    }

    /// Push a value.
    pub fn push(&self, value: Value) -> VmResult<()> {
        let frame = self.frame()?;
        let mut body = frame.lock_body();
        Ok(body.push(self.vm.heap(), value)?)
    }

    /// Push nil.
    pub fn push_nil(&self) -> VmResult<()> {
        self.push(Value::Nil)
    }

    /// Push a boolean.
    pub fn push_bool(&self, value: bool) -> VmResult<()> {
        self.push(Value::Bool(value))
    }

    /// Push a long.
    pub fn push_long(&self, value: i64) -> VmResult<()> {
        self.push(Value::Long(value))
    }

    /// Push a double.
    pub fn push_double(&self, value: f64) -> VmResult<()> {
        self.push(Value::Double(value))
    }

    /// Allocate and push a string.
    pub fn push_str(&self, text: &str) -> VmResult<()> {
        self.push(self.vm.new_string(text.as_bytes())?)
    }

    /// Allocate and push a byte string.
    pub fn push_bytes(&self, bytes: &[u8]) -> VmResult<()> {
        self.push(self.vm.new_string(bytes)?)
    }

    /// Allocate and push an empty table.
    pub fn new_table(&self) -> VmResult<()> {
        self.push(self.vm.new_table()?)
    }

    /// Pop `count` values.
    pub fn pop(&self, count: usize) -> VmResult<()> {
        let frame = self.frame()?;
        let mut body = frame.lock_body();
        for _ in 0..count {
            body.pop(self.vm.heap())?;
        }
        Ok(())
    }

    /// Push a copy of the value at `index`.
    pub fn push_value(&self, index: i32) -> VmResult<()> {
        let value = self.value_at(index)?;
        self.push(value)
    }

    /// Copy the value at `from` over the slot at `to`.
    pub fn copy(&self, from: i32, to: i32) -> VmResult<()> {
        let value = self.value_at(from)?;
        let slot = self.slot(to)?;
        let frame = self.frame()?;
        let mut body = frame.lock_body();
        Ok(body.set_slot(self.vm.heap(), slot, value)?)
    }

    /// Remove the value at `index`, shifting the slots above down.
    pub fn remove(&self, index: i32) -> VmResult<()> {
        let slot = self.slot(index)?;
        let frame = self.frame()?;
        let mut body = frame.lock_body();
        Ok(body.remove(self.vm.heap(), slot, 1)?)
    }

    /// Move the top value into `index`, popping it.
    pub fn replace(&self, index: i32) -> VmResult<()> {
        self.copy(-1, index)?;
        self.pop(1)
    }

    /// Type tag at `index`; `None` for an unoccupied index.
    pub fn type_of(&self, index: i32) -> Option<ValueType> {
        self.value_at(index).ok().map(|value| ValueType::of(&value))
    }

    /// Whether `index` does not address a live slot.
    pub fn is_none(&self, index: i32) -> bool {
        self.type_of(index).is_none()
    }

    /// Whether the value at `index` is nil.
    pub fn is_nil(&self, index: i32) -> bool {
        self.type_of(index) == Some(ValueType::Nil)
    }

    /// Whether the value at `index` is a boolean.
    pub fn is_bool(&self, index: i32) -> bool {
        self.type_of(index) == Some(ValueType::Bool)
    }

    /// Whether the value at `index` is a `Long`.
    pub fn is_long(&self, index: i32) -> bool {
        matches!(self.value_at(index), Ok(Value::Long(_)))
    }

    /// Whether the value at `index` coerces to a number.
    pub fn is_number(&self, index: i32) -> bool {
        self.value_at(index)
            .ok()
            .and_then(|value| value.to_double())
            .is_some()
    }

    /// Whether the value at `index` is a string or a number.
    pub fn is_string(&self, index: i32) -> bool {
        matches!(
            self.type_of(index),
            Some(ValueType::String | ValueType::Number)
        )
    }

    /// Whether the value at `index` is a table.
    pub fn is_table(&self, index: i32) -> bool {
        self.type_of(index) == Some(ValueType::Table)
    }

    /// Whether the value at `index` is callable.
    pub fn is_function(&self, index: i32) -> bool {
        self.type_of(index) == Some(ValueType::Function)
    }

    /// Whether the value at `index` is a native function.
    pub fn is_native_function(&self, index: i32) -> bool {
        matches!(self.value_at(index), Ok(Value::Closure(c)) if c.is_native())
    }

    /// Whether the value at `index` is any userdata flavor.
    pub fn is_userdata(&self, index: i32) -> bool {
        self.type_of(index) == Some(ValueType::Userdata)
    }

    /// Whether the value at `index` is a coroutine.
    pub fn is_coroutine(&self, index: i32) -> bool {
        self.type_of(index) == Some(ValueType::Coroutine)
    }

    /// Whether the bound coroutine may yield.
    pub fn is_yieldable(&self) -> bool {
        !self.co.is_native_thread() && self.co.is_yieldable()
    }

    /// Coerce the value at `index` to a string. Numbers are converted and
    /// the coerced form is written back into the slot, the way the C API
    /// does it.
    pub fn to_string(&self, index: i32) -> VmResult<VmString> {
        let value = self.value_at(index)?;
        match value {
            Value::String(s) => Ok(s),
            Value::Long(_) | Value::Double(_) => {
                let coerced = VmString::new(value.to_string().as_bytes())?;
                let slot = self.slot(index)?;
                let frame = self.frame()?;
                let mut body = frame.lock_body();
                body.set_slot(self.vm.heap(), slot, Value::String(coerced.clone()))?;
                Ok(coerced)
            }
            other => Err(Fault::TypeMismatch {
                expected: "string or number",
                found: other.type_name(),
            }
            .into()),
        }
    }

    /// Numeric coercion of the value at `index`.
    pub fn to_double(&self, index: i32) -> Option<f64> {
        self.value_at(index).ok().and_then(|value| value.to_double())
    }

    /// Numeric coercion truncated to an integer.
    pub fn to_long(&self, index: i32) -> Option<i64> {
        self.to_double(index).map(|d| d as i64)
    }

    /// Identity token of the value at `index`, for reference variants.
    pub fn to_pointer(&self, index: i32) -> Option<usize> {
        self.value_at(index).ok().and_then(|value| value.identity())
    }

    /// Push the length of the string or table at `index`.
    pub fn len(&self, index: i32) -> VmResult<()> {
        let value = self.value_at(index)?;
        if let Value::String(s) = &value {
            return self.push_long(s.len() as i64);
        }
        if self.trigger_metamethod("__len", &value) {
            return Ok(());
        }
        match &value {
            Value::Table(t) => self.push_long(t.len() as i64),
            other => Err(Fault::NotIndexable(other.type_name()).into()),
        }
    }

    // Metamethod dispatch point. The lookup always misses for now;
    // TODO: route __len/__index/__newindex through a metatable slot once
    // tables grow one.
    fn trigger_metamethod(&self, _name: &str, _value: &Value) -> bool {
        false
    }

    /// Call the function below the top `nargs` slots, expecting `nret`
    /// results (`-1` for all); function and arguments are consumed.
    pub fn call(&self, nargs: usize, nret: i32) -> VmResult<()> {
        let (fn_index, callee) = self.callee_at(nargs)?;
        self.vm.call_on(&self.co, callee, nargs as i32, nret)?;
        let frame = self.frame()?;
        let mut body = frame.lock_body();
        Ok(body.remove(self.vm.heap(), fn_index, 1)?)
    }

    /// Protected variant of [`call`](Stack::call): on failure the function
    /// and arguments are replaced by the error value and the status code
    /// comes back instead of an `Err`.
    pub fn pcall(&self, nargs: usize, nret: i32) -> Status {
        let depth = self.co.frame_depth();
        let (fn_index, callee) = match self.callee_at(nargs) {
            Ok(found) => found,
            Err(error) => {
                self.vm.set_error(error.into_value(self.vm));
                return Status::RuntimeError;
            }
        };

        let outcome = self
            .vm
            .call_on(&self.co, callee, nargs as i32, nret)
            .and_then(|()| {
                let frame = self.frame()?;
                let mut body = frame.lock_body();
                Ok(body.remove(self.vm.heap(), fn_index, 1)?)
            });

        match outcome {
            Ok(()) => Status::Ok,
            Err(error) => {
                let status = Status::from_error(&error);
                let value = error.into_value(self.vm);
                self.co.truncate_frames(depth);
                if let Ok(frame) = self.frame() {
                    let mut body = frame.lock_body();
                    let top = body.top();
                    if top > fn_index {
                        let _ = body.remove(self.vm.heap(), fn_index, top - fn_index);
                    }
                    let _ = body.push(self.vm.heap(), value.clone());
                }
                self.vm.set_error(value);
                status
            }
        }
    }

    /// Raise the value on top of the stack as an error.
    pub fn raise(&self) -> VmError {
        let frame = match self.frame() {
            Ok(frame) => frame,
            Err(error) => return error,
        };
        let value = {
            let mut body = frame.lock_body();
            body.pop(self.vm.heap())
        };
        match value {
            Ok(value) => VmError::Raised(value),
            Err(fault) => fault.into(),
        }
    }

    fn callee_at(&self, nargs: usize) -> VmResult<(usize, Value)> {
        let frame = self.frame()?;
        let body = frame.lock_body();
        let top = body.top();
        if nargs + 1 > top {
            return Err(Fault::InvalidStackIndex(-(nargs as i64) - 1).into());
        }
        let fn_index = top - nargs - 1;
        let callee = body
            .peek_at(fn_index)
            .cloned()
            .ok_or(Fault::StackUnderflow)?;
        Ok((fn_index, callee))
    }
}
