//! Cooperative tasks.
//!
//! A coroutine owns a LIFO stack of call frames, the fiber that executes
//! them, a thrown-error slot, and the transfer buffer values cross on
//! resume/yield boundaries. Frame pushes, pops, and walks hold the
//! per-coroutine frame lock so external walkers observe a consistent stack;
//! interpreter execution inside a frame does not take it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::backtrace::FrameView;
use crate::call::CallState;
use crate::closure::Closure;
use crate::consts::{FIBER_STACK_SIZE, VM_CALL_DEPTH};
use crate::error::{CoroutineFault, Fault, VmError, VmResult};
use crate::fiber::{Fiber, FiberState};
use crate::heap::Heap;
use crate::interpreter;
use crate::state::ResumeResult;
use crate::sync::lock;
use crate::value::Value;
use crate::vm::{Vm, VmInner};

pub(crate) struct CoroutineInner {
    owner: Weak<VmInner>,
    frames: Mutex<Vec<CallState>>,
    thrown_error: Mutex<Option<Value>>,
    has_error: AtomicBool,
    yieldable: AtomicBool,
    native_thread: bool,
    transfer: Mutex<Vec<Value>>,
    fiber: OnceLock<Fiber>,
}

/// Shared handle to a cooperative task.
#[derive(Clone)]
pub struct Coroutine {
    inner: Arc<CoroutineInner>,
}

impl Coroutine {
    /// Create a coroutine whose fiber runs `closure` under the implicit
    /// top-level protected marker. The entry frame is pushed immediately;
    /// the body does not run until the first resume.
    pub(crate) fn spawn(vm: &Vm, closure: &Closure) -> VmResult<Coroutine> {
        let co = Coroutine {
            inner: Arc::new(CoroutineInner {
                owner: vm.downgrade(),
                frames: Mutex::new(Vec::new()),
                thrown_error: Mutex::new(None),
                has_error: AtomicBool::new(false),
                yieldable: AtomicBool::new(true),
                native_thread: false,
                transfer: Mutex::new(Vec::new()),
                fiber: OnceLock::new(),
            }),
        };
        co.push_frame(vm.heap(), closure.clone())?;

        let weak_vm = vm.downgrade();
        let weak_co = Arc::downgrade(&co.inner);
        let fiber = Fiber::spawn(FIBER_STACK_SIZE, move || fiber_entry(weak_vm, weak_co))?;
        let _ = co.inner.fiber.set(fiber);
        Ok(co)
    }

    /// The coroutine representing the host's own thread: no fiber, never
    /// suspendable, with a base frame so host stack operations work outside
    /// any spawned coroutine.
    pub(crate) fn new_main(vm: &Vm, base: &Closure) -> VmResult<Coroutine> {
        let co = Coroutine {
            inner: Arc::new(CoroutineInner {
                owner: vm.downgrade(),
                frames: Mutex::new(Vec::new()),
                thrown_error: Mutex::new(None),
                has_error: AtomicBool::new(false),
                yieldable: AtomicBool::new(false),
                native_thread: true,
                transfer: Mutex::new(Vec::new()),
                fiber: OnceLock::new(),
            }),
        };
        co.push_frame(vm.heap(), base.clone())?;
        Ok(co)
    }

    /// Fiber state; the native top-level thread reads as `Running`.
    pub fn state(&self) -> FiberState {
        match self.inner.fiber.get() {
            Some(fiber) => fiber.state(),
            None => FiberState::Running,
        }
    }

    /// Whether this coroutine wraps the host's own thread.
    pub fn is_native_thread(&self) -> bool {
        self.inner.native_thread
    }

    /// Whether yielding is currently permitted.
    pub fn is_yieldable(&self) -> bool {
        self.inner.yieldable.load(Ordering::Relaxed)
    }

    pub(crate) fn set_yieldable(&self, yieldable: bool) {
        self.inner.yieldable.store(yieldable, Ordering::Relaxed);
    }

    /// Whether the body escaped with an error.
    pub fn has_error(&self) -> bool {
        self.inner.has_error.load(Ordering::Acquire)
    }

    /// The error value the body escaped with, if any.
    pub fn thrown_error(&self) -> Option<Value> {
        lock(&self.inner.thrown_error).clone()
    }

    /// Switch into the coroutine until it yields or completes.
    ///
    /// `args` become the entry closure's stack arguments on the first
    /// resume, and the results of the pending `yield` afterwards. The
    /// returned values are what the coroutine yielded, or its final results
    /// once [`ResumeResult::is_finished`].
    pub fn resume(&self, vm: &Vm, args: &[Value]) -> VmResult<ResumeResult> {
        let Some(fiber) = self.inner.fiber.get() else {
            return Err(CoroutineFault::ResumeRunning.into());
        };

        self.set_transfer(args.to_vec());
        vm.push_current(self.clone());
        let switched = fiber.resume();
        vm.pop_current();

        match switched {
            Err(FiberState::Dead) => Err(CoroutineFault::ResumeDead.into()),
            Err(_) => Err(CoroutineFault::ResumeRunning.into()),
            Ok(()) => {
                if self.has_error() {
                    let value = self.thrown_error().unwrap_or(Value::Nil);
                    Err(VmError::Raised(value))
                } else {
                    Ok(ResumeResult {
                        values: self.take_transfer(),
                        state: self.state(),
                    })
                }
            }
        }
    }

    /// Cancel a suspended coroutine: its pending suspension point wakes with
    /// a cancellation fault, the body unwinds through the top-level marker,
    /// and the fiber reaches `Dead`. Closing a dead coroutine or the native
    /// top-level thread is a no-op.
    pub fn close(&self) -> VmResult<()> {
        let Some(fiber) = self.inner.fiber.get() else {
            return Ok(());
        };
        fiber
            .cancel()
            .map_err(|_| CoroutineFault::CloseRunning.into())
    }

    pub(crate) fn yield_to_resumer(&self, values: Vec<Value>) -> VmResult<Vec<Value>> {
        if self.is_native_thread() {
            return Err(CoroutineFault::YieldMainThread.into());
        }
        if !self.is_yieldable() {
            return Err(CoroutineFault::YieldDisabled.into());
        }
        let Some(fiber) = self.inner.fiber.get() else {
            return Err(CoroutineFault::YieldOutside.into());
        };
        self.set_transfer(values);
        fiber.yield_now()?;
        Ok(self.take_transfer())
    }

    /// Current call-frame depth.
    pub fn frame_depth(&self) -> usize {
        lock(&self.inner.frames).len()
    }

    /// The innermost frame.
    pub fn current_frame(&self) -> Option<CallState> {
        lock(&self.inner.frames).last().cloned()
    }

    /// Function-entry prolog: push a fresh frame for `closure`.
    pub(crate) fn push_frame(&self, heap: &Heap, closure: Closure) -> Result<CallState, Fault> {
        let mut frames = lock(&self.inner.frames);
        if frames.len() >= VM_CALL_DEPTH {
            return Err(Fault::CallDepthExceeded);
        }
        frames.try_reserve(1).map_err(|_| Fault::OutOfMemory)?;
        let frame = CallState::new(heap, closure, Arc::downgrade(&self.inner))?;
        frames.push(frame.clone());
        Ok(frame)
    }

    /// Function-exit epilog: pop the innermost frame.
    pub(crate) fn pop_frame(&self) {
        lock(&self.inner.frames).pop();
    }

    /// Unwind the frame stack down to `depth`.
    pub(crate) fn truncate_frames(&self, depth: usize) {
        lock(&self.inner.frames).truncate(depth);
    }

    pub(crate) fn set_transfer(&self, values: Vec<Value>) {
        *lock(&self.inner.transfer) = values;
    }

    pub(crate) fn take_transfer(&self) -> Vec<Value> {
        std::mem::take(&mut *lock(&self.inner.transfer))
    }

    /// Iterate over the call frames under the frame lock, innermost last
    /// (or first, when `backward`), stopping when `consumer` returns
    /// `false`.
    pub fn walk_frames(&self, backward: bool, mut consumer: impl FnMut(&FrameView) -> bool) {
        let frames = lock(&self.inner.frames);
        let len = frames.len();
        for offset in 0..len {
            let pos = if backward { len - offset - 1 } else { offset };
            let view = FrameView::capture(&frames[pos], pos == 0);
            if !consumer(&view) {
                break;
            }
        }
    }

    /// The owning VM, while it is alive.
    pub fn owner(&self) -> Option<Vm> {
        self.inner.owner.upgrade().map(Vm::from_inner)
    }

    /// Stable identity token.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Coroutine) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coroutine")
            .field("addr", &format_args!("0x{:x}", self.addr()))
            .field("state", &self.state())
            .field("frames", &self.frame_depth())
            .finish()
    }
}

fn fiber_entry(vm: Weak<VmInner>, co: Weak<CoroutineInner>) {
    let Some(vm_inner) = vm.upgrade() else { return };
    let Some(co_inner) = co.upgrade() else { return };
    let vm = Vm::from_inner(vm_inner);
    let co = Coroutine { inner: co_inner };

    tracing::debug!(coroutine = co.addr(), "coroutine body starting");
    match interpreter::run_coroutine_body(&vm, &co) {
        Ok(values) => co.set_transfer(values),
        Err(err) => {
            tracing::debug!(coroutine = co.addr(), error = %err, "coroutine body failed");
            let value = err.into_value(&vm);
            *lock(&co.inner.thrown_error) = Some(value);
            co.inner.has_error.store(true, Ordering::Release);
        }
    }
    // top-level marker: the whole frame stack unwinds with the body
    co.truncate_frames(0);
    tracing::debug!(coroutine = co.addr(), "coroutine body finished");
}
