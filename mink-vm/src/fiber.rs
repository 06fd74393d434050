//! The context-switch primitive behind coroutines.
//!
//! A fiber runs its entry on a dedicated thread with its own stack, created
//! at fiber construction. A condvar rendezvous hands execution back and
//! forth: the fiber side is parked whenever the resumer runs and vice versa,
//! so exactly one side makes progress at any time. State transitions are
//! `Suspended → Running` on resume, `Running → Suspended` on yield, and
//! `Running → Dead` when the entry returns; `Dead` is terminal.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::{CoroutineFault, Fault};
use crate::sync::{lock, wait};

/// Lifecycle state of a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiberState {
    /// Parked; a resume may switch into it.
    Suspended,
    /// Currently executing its entry.
    Running,
    /// The entry returned. Terminal.
    Dead,
}

impl fmt::Display for FiberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FiberState::Suspended => "suspended",
            FiberState::Running => "running",
            FiberState::Dead => "dead",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    Resumer,
    Fiber,
}

#[derive(Debug)]
struct Cell {
    state: FiberState,
    turn: Turn,
    cancelled: bool,
}

#[derive(Debug)]
struct Shared {
    cell: Mutex<Cell>,
    cond: Condvar,
}

/// A stackful execution context.
#[derive(Debug)]
pub(crate) struct Fiber {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Fiber {
    /// Spawn a fiber whose entry runs on a dedicated `stack_size`-byte
    /// stack. The entry does not start until the first resume.
    pub(crate) fn spawn<F>(stack_size: usize, entry: F) -> Result<Fiber, Fault>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            cell: Mutex::new(Cell {
                state: FiberState::Suspended,
                turn: Turn::Resumer,
                cancelled: false,
            }),
            cond: Condvar::new(),
        });
        let inner = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("mink-fiber".into())
            .stack_size(stack_size)
            .spawn(move || fiber_main(inner, entry))
            .map_err(|_| Fault::OutOfMemory)?;
        Ok(Fiber {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Current lifecycle state.
    pub(crate) fn state(&self) -> FiberState {
        lock(&self.shared.cell).state
    }

    /// Switch into the fiber until it yields or dies. On a wrong-state
    /// attempt the observed state comes back as the error.
    pub(crate) fn resume(&self) -> Result<(), FiberState> {
        let mut cell = lock(&self.shared.cell);
        if cell.state != FiberState::Suspended {
            return Err(cell.state);
        }
        cell.state = FiberState::Running;
        cell.turn = Turn::Fiber;
        self.shared.cond.notify_all();
        while cell.turn == Turn::Fiber {
            cell = wait(&self.shared.cond, cell);
        }
        Ok(())
    }

    /// Switch back to the resumer. Must be called from inside the entry.
    pub(crate) fn yield_now(&self) -> Result<(), Fault> {
        let mut cell = lock(&self.shared.cell);
        debug_assert_eq!(cell.state, FiberState::Running);
        cell.state = FiberState::Suspended;
        cell.turn = Turn::Resumer;
        self.shared.cond.notify_all();
        while cell.turn == Turn::Resumer {
            cell = wait(&self.shared.cond, cell);
        }
        if cell.cancelled {
            return Err(Fault::CoroutineState(CoroutineFault::Cancelled));
        }
        cell.state = FiberState::Running;
        Ok(())
    }

    /// Cancel a suspended fiber: its pending yield (or initial park) wakes
    /// with a cancellation fault, the entry unwinds, and the fiber reaches
    /// `Dead` before this returns. Cancelling a dead fiber is a no-op.
    pub(crate) fn cancel(&self) -> Result<(), FiberState> {
        let mut cell = lock(&self.shared.cell);
        match cell.state {
            FiberState::Dead => return Ok(()),
            FiberState::Running => return Err(FiberState::Running),
            FiberState::Suspended => {}
        }
        cell.cancelled = true;
        cell.turn = Turn::Fiber;
        self.shared.cond.notify_all();
        while cell.turn == Turn::Fiber {
            cell = wait(&self.shared.cond, cell);
        }
        Ok(())
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        {
            let mut cell = lock(&self.shared.cell);
            if cell.state != FiberState::Dead {
                // wake the parked side; a pending yield surfaces the
                // cancellation fault and unwinds the entry
                cell.cancelled = true;
                cell.turn = Turn::Fiber;
                self.shared.cond.notify_all();
            }
        }
        if let Some(handle) = lock(&self.thread).take() {
            let _ = handle.join();
        }
    }
}

fn fiber_main<F: FnOnce()>(shared: Arc<Shared>, entry: F) {
    {
        let mut cell = lock(&shared.cell);
        while cell.turn == Turn::Resumer {
            cell = wait(&shared.cond, cell);
        }
        if cell.cancelled {
            cell.state = FiberState::Dead;
            cell.turn = Turn::Resumer;
            shared.cond.notify_all();
            return;
        }
    }

    entry();

    let mut cell = lock(&shared.cell);
    cell.state = FiberState::Dead;
    cell.turn = Turn::Resumer;
    shared.cond.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn one_shot_entry_goes_suspended_then_dead() {
        let steps = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&steps);
        let fiber = Fiber::spawn(64 * 1024, move || {
            observed.store(1, Ordering::SeqCst);
        })
        .expect("spawn");

        assert_eq!(fiber.state(), FiberState::Suspended);
        fiber.resume().expect("first resume");
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert_eq!(fiber.state(), FiberState::Dead);
        assert_eq!(fiber.resume(), Err(FiberState::Dead));
    }

    #[test]
    fn yield_suspends_and_resumes_in_order() {
        let fiber = Arc::new(Mutex::new(None::<Arc<Fiber>>));
        let trace = Arc::new(Mutex::new(Vec::new()));

        let fiber_slot = Arc::clone(&fiber);
        let fiber_trace = Arc::clone(&trace);
        let created = Arc::new(
            Fiber::spawn(64 * 1024, move || {
                let this = lock(&fiber_slot).clone().expect("self handle");
                lock(&fiber_trace).push("a");
                this.yield_now().expect("yield");
                lock(&fiber_trace).push("b");
            })
            .expect("spawn"),
        );
        *lock(&fiber) = Some(Arc::clone(&created));

        created.resume().expect("resume to first yield");
        assert_eq!(created.state(), FiberState::Suspended);
        assert_eq!(*lock(&trace), vec!["a"]);

        created.resume().expect("resume to completion");
        assert_eq!(created.state(), FiberState::Dead);
        assert_eq!(*lock(&trace), vec!["a", "b"]);
    }

    #[test]
    fn cancel_wakes_a_pending_yield_with_a_fault() {
        let fiber = Arc::new(Mutex::new(None::<Arc<Fiber>>));
        let saw_cancel = Arc::new(AtomicUsize::new(0));

        let fiber_slot = Arc::clone(&fiber);
        let cancel_flag = Arc::clone(&saw_cancel);
        let created = Arc::new(
            Fiber::spawn(64 * 1024, move || {
                let this = lock(&fiber_slot).clone().expect("self handle");
                if this.yield_now().is_err() {
                    cancel_flag.store(1, Ordering::SeqCst);
                }
            })
            .expect("spawn"),
        );
        *lock(&fiber) = Some(Arc::clone(&created));

        created.resume().expect("reach the yield");
        created.cancel().expect("cancel suspended fiber");
        assert_eq!(saw_cancel.load(Ordering::SeqCst), 1);
        assert_eq!(created.state(), FiberState::Dead);
        // idempotent once dead
        created.cancel().expect("cancel dead fiber");
    }

    #[test]
    fn cancel_of_a_never_started_fiber_skips_the_entry() {
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        let fiber = Fiber::spawn(64 * 1024, move || {
            flag.store(1, Ordering::SeqCst);
        })
        .expect("spawn");
        fiber.cancel().expect("cancel");
        assert_eq!(fiber.state(), FiberState::Dead);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn never_started_fiber_drops_cleanly() {
        let fiber = Fiber::spawn(64 * 1024, || {}).expect("spawn");
        assert_eq!(fiber.state(), FiberState::Suspended);
        drop(fiber);
    }
}
