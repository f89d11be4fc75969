// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Broadcast wakeups for predicate waits.
//!
//! Every exclusive release bumps a generation counter and wakes all waiters.
//! A waiter registers (and snapshots the generation) while it still holds
//! the data lock, so a release that lands between its unlock and its sleep
//! is never missed.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex, MutexGuard};

pub(crate) struct Wakeups {
    generation: Mutex<u64>,
    changed: Condvar,
    waiters: AtomicUsize,
}

impl Wakeups {
    pub(crate) fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            changed: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Wakes every registered waiter. Called with the data lock held
    /// exclusively.
    pub(crate) fn broadcast(&self) {
        if self.waiters.load(Ordering::Acquire) == 0 {
            return;
        }
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.changed.notify_all();
    }

    /// Registers a waiter. Must be called before the data lock is released.
    pub(crate) fn register(&self) -> Ticket<'_> {
        self.waiters.fetch_add(1, Ordering::AcqRel);
        let guard = self.generation.lock();
        let seen = *guard;
        Ticket {
            wakeups: self,
            guard,
            seen,
        }
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

pub(crate) struct Ticket<'a> {
    wakeups: &'a Wakeups,
    guard: MutexGuard<'a, u64>,
    seen: u64,
}

impl Ticket<'_> {
    /// Sleeps until a broadcast issued after registration.
    pub(crate) fn wait(mut self) {
        while *self.guard == self.seen {
            self.wakeups.changed.wait(&mut self.guard);
        }
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.wakeups.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}
