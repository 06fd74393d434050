//! Callable bindings: interpreted prototypes and native functions.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::bytecode::Prototype;
use crate::error::VmResult;
use crate::value::Value;
use crate::vm::Vm;

/// Signature of a host function callable from the VM.
///
/// The function operates on the current frame through the stack API and
/// returns the number of results it left on top of its operand stack.
pub type NativeFn = fn(&Vm, Option<&NativeData>) -> VmResult<usize>;

/// Opaque user data carried by a native closure. Cleanup happens in the
/// payload's `Drop`.
pub struct NativeData(Box<dyn Any + Send + Sync>);

impl NativeData {
    /// Wrap a host payload.
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        NativeData(Box::new(payload))
    }

    /// Downcast to the concrete payload type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for NativeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeData")
    }
}

#[derive(Debug)]
enum ClosureKind {
    Bytecode(Arc<Prototype>),
    Native {
        func: NativeFn,
        data: Option<NativeData>,
    },
}

#[derive(Debug)]
struct ClosureInner {
    kind: ClosureKind,
    env: Value,
}

/// A callable binding: a prototype closed over an environment, or a native
/// function with its user data.
#[derive(Clone)]
pub struct Closure(Arc<ClosureInner>);

impl Closure {
    /// Bind `prototype` to `env`.
    pub fn from_prototype(prototype: Arc<Prototype>, env: Value) -> Self {
        Closure(Arc::new(ClosureInner {
            kind: ClosureKind::Bytecode(prototype),
            env,
        }))
    }

    /// Bind a native function and optional user data to `env`.
    pub fn from_native(func: NativeFn, data: Option<NativeData>, env: Value) -> Self {
        Closure(Arc::new(ClosureInner {
            kind: ClosureKind::Native { func, data },
            env,
        }))
    }

    /// The bound environment.
    pub fn env(&self) -> &Value {
        &self.0.env
    }

    /// Whether the closure wraps a native function.
    pub fn is_native(&self) -> bool {
        matches!(self.0.kind, ClosureKind::Native { .. })
    }

    /// The prototype of an interpreted closure.
    pub fn prototype(&self) -> Option<&Arc<Prototype>> {
        match &self.0.kind {
            ClosureKind::Bytecode(prototype) => Some(prototype),
            ClosureKind::Native { .. } => None,
        }
    }

    pub(crate) fn native(&self) -> Option<(NativeFn, Option<&NativeData>)> {
        match &self.0.kind {
            ClosureKind::Native { func, data } => Some((*func, data.as_ref())),
            ClosureKind::Bytecode(_) => None,
        }
    }

    /// The closure as a value. Handles are shared, so this never copies the
    /// closure itself.
    pub fn as_value(&self) -> Value {
        Value::Closure(self.clone())
    }

    /// Stable identity token.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Closure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_native() { "native" } else { "bytecode" };
        write!(f, "Closure({kind} 0x{:x})", self.addr())
    }
}
