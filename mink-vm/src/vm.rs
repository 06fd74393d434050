//! The process-wide VM owner.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::backtrace;
use crate::closure::{Closure, NativeData};
use crate::coroutine::Coroutine;
use crate::error::{CoroutineFault, Fault, VmError, VmResult};
use crate::heap::{Heap, RootRef};
use crate::interpreter::{Arity, Executor};
use crate::strings::{Interner, StaticStrings, VmString};
use crate::sync::lock;
use crate::table::TableRef;
use crate::userdata::{GcObject, LightUserdata, UserdataFinalizer, UserdataRef};
use crate::value::Value;

pub(crate) struct VmInner {
    heap: Heap,
    interner: Interner,
    strings: StaticStrings,
    /// Current-coroutine stack; cooperative handoff guarantees one runner,
    /// the lock covers cross-thread walkers.
    current: Mutex<Vec<Coroutine>>,
    error: Mutex<Option<Value>>,
    registry: OnceLock<Value>,
    main: OnceLock<Coroutine>,
    /// Root set pinning live spawned coroutines.
    coroutines: Mutex<Vec<(Coroutine, RootRef)>>,
    roots: Mutex<Vec<RootRef>>,
    next_module: AtomicI32,
}

/// Shared handle to a VM instance.
#[derive(Clone)]
pub struct Vm {
    inner: Arc<VmInner>,
}

fn main_entry(_vm: &Vm, _data: Option<&NativeData>) -> VmResult<usize> {
    Ok(0)
}

impl Vm {
    /// Create a VM: heap descriptors, the static string pool, the registry
    /// table, and the native top-level thread.
    pub fn new() -> VmResult<Vm> {
        let heap = Heap::new();
        heap.register_descriptor::<VmString>("mink.value.String");
        heap.register_descriptor::<TableRef>("mink.value.Table");
        heap.register_descriptor::<Closure>("mink.value.Closure");
        heap.register_descriptor::<Coroutine>("mink.coroutine.Coroutine");
        heap.register_descriptor::<crate::call::CallState>("mink.coroutine.CallState");
        heap.register_descriptor::<UserdataRef>("mink.value.Userdata");

        let interner = Interner::default();
        let strings = StaticStrings::new(&interner)?;
        let vm = Vm {
            inner: Arc::new(VmInner {
                heap,
                interner,
                strings,
                current: Mutex::new(Vec::new()),
                error: Mutex::new(None),
                registry: OnceLock::new(),
                main: OnceLock::new(),
                coroutines: Mutex::new(Vec::new()),
                roots: Mutex::new(Vec::new()),
                next_module: AtomicI32::new(1),
            }),
        };

        let base = Closure::from_native(main_entry, None, Value::Nil);
        let main = Coroutine::new_main(&vm, &base)?;
        let _ = vm.inner.main.set(main);

        let registry = vm.new_table()?;
        let root = vm.heap().root_add(registry.clone());
        lock(&vm.inner.roots).push(root);
        let _ = vm.inner.registry.set(registry);

        Ok(vm)
    }

    pub(crate) fn from_inner(inner: Arc<VmInner>) -> Vm {
        Vm { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<VmInner> {
        Arc::downgrade(&self.inner)
    }

    /// The collector.
    pub fn heap(&self) -> &Heap {
        &self.inner.heap
    }

    pub(crate) fn strings(&self) -> &StaticStrings {
        &self.inner.strings
    }

    /// The registry table of the host API.
    pub fn registry(&self) -> Value {
        self.inner.registry.get().cloned().unwrap_or(Value::Nil)
    }

    /// The coroutine representing the host's own thread.
    pub fn main_thread(&self) -> Coroutine {
        self.inner
            .main
            .get()
            .cloned()
            .expect("main thread is created in Vm::new")
    }

    /// The coroutine currently executing, if any.
    pub fn current_coroutine(&self) -> Option<Coroutine> {
        lock(&self.inner.current).last().cloned()
    }

    pub(crate) fn current_or_main(&self) -> Coroutine {
        self.current_coroutine()
            .unwrap_or_else(|| self.main_thread())
    }

    pub(crate) fn push_current(&self, co: Coroutine) {
        lock(&self.inner.current).push(co);
    }

    pub(crate) fn pop_current(&self) {
        lock(&self.inner.current).pop();
    }

    /// Allocate a fresh module identifier for userdata registration.
    pub fn next_module_id(&self) -> i32 {
        self.inner.next_module.fetch_add(1, Ordering::Relaxed)
    }

    /// Store the last-error slot.
    pub fn set_error(&self, value: Value) {
        *lock(&self.inner.error) = Some(value);
    }

    /// Take the last-error slot.
    pub fn take_error(&self) -> Option<Value> {
        lock(&self.inner.error).take()
    }

    /// Peek the last-error slot.
    pub fn last_error(&self) -> Option<Value> {
        lock(&self.inner.error).clone()
    }

    /// Allocate a string value.
    pub fn new_string(&self, bytes: &[u8]) -> VmResult<Value> {
        Ok(Value::String(VmString::new(bytes)?))
    }

    /// Intern a constant string and return it as a value.
    pub fn intern(&self, bytes: &[u8]) -> VmResult<Value> {
        Ok(Value::String(self.intern_string(bytes)?))
    }

    /// Intern a constant string.
    pub fn intern_string(&self, bytes: &[u8]) -> VmResult<VmString> {
        Ok(self.inner.interner.intern(bytes)?)
    }

    /// Allocate an empty table value.
    pub fn new_table(&self) -> VmResult<Value> {
        self.new_table_with_capacity(crate::consts::TABLE_DEFAULT_CAPACITY)
    }

    /// Allocate a table value with reserved capacity.
    pub fn new_table_with_capacity(&self, capacity: usize) -> VmResult<Value> {
        Ok(Value::Table(TableRef::with_capacity(capacity)?))
    }

    /// Allocate a full userdata buffer value.
    pub fn new_full_userdata(
        &self,
        module: i32,
        type_id: i32,
        size: usize,
        finalizer: Option<UserdataFinalizer>,
    ) -> VmResult<Value> {
        Ok(Value::FullUserdata(UserdataRef::new(
            module, type_id, size, finalizer,
        )?))
    }

    /// Wrap a raw host pointer as a light userdata value.
    pub fn new_light_userdata(
        &self,
        module: i32,
        type_id: i32,
        ptr: *mut core::ffi::c_void,
    ) -> Value {
        Value::LightUserdata(LightUserdata::new(module, type_id, ptr))
    }

    /// Wrap a collector-managed host object as a userdata value.
    pub fn new_gc_userdata(&self, object: GcObject) -> Value {
        Value::GcUserdata(object)
    }

    /// Coerce a value to its string form: strings pass through, booleans
    /// and nil map to the interned literals, everything else formats.
    pub fn coerce_to_string(&self, value: &Value) -> VmResult<Value> {
        Ok(match value {
            Value::String(_) => value.clone(),
            Value::Nil => Value::String(self.inner.strings.nil.clone()),
            Value::Bool(true) => Value::String(self.inner.strings.bool_true.clone()),
            Value::Bool(false) => Value::String(self.inner.strings.bool_false.clone()),
            other => self.new_string(other.to_string().as_bytes())?,
        })
    }

    /// Create a coroutine over `closure` and pin it in the VM root set.
    pub fn spawn_coroutine(&self, closure: &Closure) -> VmResult<Coroutine> {
        let co = Coroutine::spawn(self, closure)?;
        let root = self.heap().root_add(Value::Coroutine(co.clone()));
        lock(&self.inner.coroutines).push((co.clone(), root));
        Ok(co)
    }

    /// Close every pinned coroutine and release its root.
    ///
    /// Suspended bodies unwind with a cancellation fault; a coroutine that
    /// is somehow still running is skipped. Call before dropping the last
    /// host handle for deterministic teardown.
    pub fn shutdown(&self) {
        let coroutines = std::mem::take(&mut *lock(&self.inner.coroutines));
        for (co, root) in coroutines {
            if co.close().is_err() {
                tracing::warn!(coroutine = co.addr(), "shutdown skipped a running coroutine");
            }
            self.heap().root_remove(root);
        }
    }

    /// Suspend the current coroutine, handing `values` to its resumer. The
    /// result carries the arguments of the next resume.
    pub fn yield_values(&self, values: Vec<Value>) -> VmResult<Vec<Value>> {
        let Some(co) = self.current_coroutine() else {
            return Err(CoroutineFault::YieldOutside.into());
        };
        co.yield_to_resumer(values)
    }

    /// Forbid yielding in the current coroutine; native sections that must
    /// not be suspended bracket themselves with this and
    /// [`allow_yield`](Vm::allow_yield).
    pub fn disallow_yield(&self) {
        if let Some(co) = self.current_coroutine() {
            co.set_yieldable(false);
        }
    }

    /// Re-enable yielding in the current coroutine.
    pub fn allow_yield(&self) {
        if let Some(co) = self.current_coroutine() {
            co.set_yieldable(true);
        }
    }

    /// Invoke `callee` on the current (or main) coroutine with the top
    /// `nargs` slots of its current frame as arguments, expecting `nret`
    /// results; negative counts mean "all".
    pub fn call_value(&self, callee: Value, nargs: i32, nret: i32) -> VmResult<()> {
        let co = self.current_or_main();
        self.call_on(&co, callee, nargs, nret)
    }

    /// Invoke `callee` on a specific coroutine's current frame.
    pub(crate) fn call_on(
        &self,
        co: &Coroutine,
        callee: Value,
        nargs: i32,
        nret: i32,
    ) -> VmResult<()> {
        let co = co.clone();
        let frame = co.current_frame().ok_or(Fault::StackUnderflow)?;

        let already_current = self
            .current_coroutine()
            .is_some_and(|current| current.ptr_eq(&co));
        if !already_current {
            self.push_current(co.clone());
        }

        let mut body = frame.lock_body();
        let outcome = Executor::new(self, co.clone()).call_value(
            &frame,
            &mut body,
            callee,
            Arity::from_count(nargs),
            Arity::from_count(nret),
        );
        drop(body);

        if !already_current {
            self.pop_current();
        }
        outcome
    }

    /// Run `body` under a protected boundary: see
    /// [`protected_call_with`](Vm::protected_call_with).
    pub fn protected_call<T>(&self, body: impl FnOnce(&Vm) -> VmResult<T>) -> VmResult<T> {
        self.protected_call_with(body, |_, value| value)
    }

    /// Run `body` under a protected boundary with a message handler.
    ///
    /// On failure the error is coerced to its value form, the handler maps
    /// it, the frame stack is trimmed back to its pre-call depth under the
    /// frame lock, the last-error slot is set, and the mapped value comes
    /// back as `VmError::Raised`. Nesting is unlimited.
    pub fn protected_call_with<T>(
        &self,
        body: impl FnOnce(&Vm) -> VmResult<T>,
        handler: impl FnOnce(&Vm, Value) -> Value,
    ) -> VmResult<T> {
        let co = self.current_or_main();
        let depth = co.frame_depth();
        match body(self) {
            Ok(value) => Ok(value),
            Err(error) => {
                let value = handler(self, error.into_value(self));
                co.truncate_frames(depth);
                self.set_error(value.clone());
                Err(VmError::Raised(value))
            }
        }
    }

    /// Attach a native debug descriptor to the current frame.
    pub fn set_debug_info(&self, info: crate::call::NativeDebugInfo) {
        if let Some(frame) = self.current_or_main().current_frame() {
            frame.set_debug_info(info);
        }
    }

    /// Report an error that reached the host with no protected frame left:
    /// write a diagnostic with the coerced error text and a backtrace of
    /// the current coroutine, then abort the process.
    pub fn fatal_error(&self, error: &VmError) -> ! {
        let co = self.current_or_main();
        let trace = backtrace::render(&co);
        tracing::error!(%error, "unhandled error");
        eprintln!("mink: unhandled error: {error}\n{trace}");
        std::process::abort()
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("heap", &self.inner.heap)
            .field("current_depth", &lock(&self.inner.current).len())
            .finish()
    }
}
