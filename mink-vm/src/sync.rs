//! Poison-tolerant locking helpers.
//!
//! The engine is cooperatively scheduled; a poisoned mutex can only come from
//! a host panic on a fiber thread, and the data under every lock stays
//! well-formed across suspension points, so lock acquisition recovers the
//! guard instead of propagating the poison.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}
