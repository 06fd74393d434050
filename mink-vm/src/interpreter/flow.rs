//! The call protocol.

use crate::call::{CallBody, CallState};
use crate::error::{Fault, VmResult};
use crate::value::Value;

use super::Executor;

/// Argument or result count of a call; `All` is the `-1` convention of the
/// host protocol and the `1` sentinel of the `CALL` operand encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arity {
    /// Every available slot.
    All,
    /// Exactly this many slots.
    Exactly(usize),
}

impl Arity {
    /// Decode a `CALL` operand field: `0` means none, `1` means all,
    /// otherwise the field minus one.
    pub(crate) fn from_field(field: u16) -> Arity {
        match field {
            0 => Arity::Exactly(0),
            1 => Arity::All,
            n => Arity::Exactly(n as usize - 1),
        }
    }

    /// Decode a host-protocol count where negative means all.
    pub(crate) fn from_count(count: i32) -> Arity {
        if count < 0 {
            Arity::All
        } else {
            Arity::Exactly(count as usize)
        }
    }
}

impl Executor<'_> {
    /// Invoke `callee` with arguments taken from the top of the caller's
    /// operand stack, and copy its results back.
    ///
    /// Prolog and epilog push and pop the callee frame on the coroutine's
    /// frame stack under the frame lock; on failure the callee frame is
    /// popped here and outer frames unwind through the protected-call trim.
    pub(crate) fn call_value(
        &self,
        _caller: &CallState,
        caller_body: &mut CallBody,
        callee: Value,
        args: Arity,
        results: Arity,
    ) -> VmResult<()> {
        let Value::Closure(closure) = &callee else {
            return Err(Fault::NotCallable(callee.type_name()).into());
        };
        let heap = self.vm.heap();

        let available = caller_body.top();
        let take = match args {
            Arity::All => available,
            // arg window start clamps at the stack bottom
            Arity::Exactly(n) => n.min(available),
        };

        let callee_frame = self.co.push_frame(heap, closure.clone())?;
        let outcome = (|| -> VmResult<()> {
            {
                let mut callee_body = callee_frame.lock_body();
                for index in available - take..available {
                    let value = caller_body
                        .peek_at(index)
                        .cloned()
                        .ok_or(Fault::StackUnderflow)?;
                    callee_body.push(heap, value)?;
                }
            }
            for _ in 0..take {
                caller_body.pop(heap)?;
            }

            let produced = self.run_frame(&callee_frame)?;

            let callee_body = callee_frame.lock_body();
            let want = match results {
                Arity::All => produced,
                Arity::Exactly(n) => n,
            };
            let base = callee_body.top() - produced;
            for offset in 0..want {
                let value = if offset < produced {
                    callee_body
                        .peek_at(base + offset)
                        .cloned()
                        .ok_or(Fault::StackUnderflow)?
                } else {
                    // missing positions receive nil
                    Value::Nil
                };
                caller_body.push(heap, value)?;
            }
            Ok(())
        })();

        self.co.pop_frame();
        outcome
    }
}
