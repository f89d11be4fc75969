// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Ordered checkpoints for multithreaded tests.
//!
//! A sequencer counts released marks. `mark(n)` blocks until exactly `n`
//! marks have been released since the last reset, so interleavings can be
//! pinned down without sleeps:
//!
//! ```
//! use std::sync::Arc;
//! use lockstep_sync::Sequencer;
//!
//! let seq = Arc::new(Sequencer::new());
//! let s = seq.clone();
//! let second = std::thread::spawn(move || {
//!     let _mark = s.mark(1).unwrap();
//!     "second"
//! });
//! let first = seq.mark(0).unwrap();
//! first.release().unwrap();
//! assert_eq!(second.join().unwrap(), "second");
//! ```

use crate::concurrent::Concurrent;
use crate::error::LockError;

#[derive(Debug, Default)]
pub struct Sequencer {
    next: Concurrent<usize>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the release count equals `step`.
    ///
    /// The count only grows, by one per released mark, so a `step` below
    /// the current count blocks until the next `reset`.
    pub fn mark(&self, step: usize) -> Result<Mark<'_>, LockError> {
        let mut next = self.next.acquire_lock_shared()?;
        next.wait(|next| *next == step)?;
        Ok(Mark {
            sequencer: self,
            step,
            released: false,
        })
    }

    /// Sets the count back to 0, releasing anyone blocked on `mark(0)`.
    /// Marks still held count from 0 when they are released.
    pub fn reset(&self) -> Result<(), LockError> {
        self.next.run_with_lock(|next| *next = 0)
    }

    fn advance(&self) -> Result<(), LockError> {
        self.next.run_with_lock(|next| *next += 1)
    }
}

/// Lets the next mark through when released or dropped.
#[derive(Debug)]
#[must_use = "dropping a mark releases it immediately"]
pub struct Mark<'a> {
    sequencer: &'a Sequencer,
    step: usize,
    released: bool,
}

impl Mark<'_> {
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.sequencer.advance()
    }
}

impl Drop for Mark<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.sequencer.advance() {
            tracing::warn!(step = self.step, %err, "failed to release sequence mark");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn marks_run_in_order() {
        let seq = Arc::new(Sequencer::new());
        let order = Arc::new(Concurrent::new(Vec::new()));
        let mut handles = vec![];
        for step in (0..4).rev() {
            let (seq, order) = (seq.clone(), order.clone());
            handles.push(std::thread::spawn(move || {
                let _mark = seq.mark(step).unwrap();
                order.run_with_lock(|o| o.push(step)).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let order = order.run_with_lock_shared(|o| o.clone()).unwrap();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn each_release_counts_once() {
        let seq = Sequencer::new();
        seq.mark(0).unwrap().release().unwrap();
        drop(seq.mark(1).unwrap());
        assert_eq!(seq.next.run_with_lock_shared(|n| *n).unwrap(), 2);
    }

    #[test]
    fn mark_held_across_reset_counts_from_zero() {
        let seq = Sequencer::new();
        seq.mark(0).unwrap().release().unwrap();
        let held = seq.mark(1).unwrap();
        seq.reset().unwrap();
        held.release().unwrap();
        // One release since the reset, so step 1 is next.
        let mark = seq.mark(1).unwrap();
        assert_eq!(mark.step(), 1);
    }

    #[test]
    fn reset_starts_over() {
        let seq = Sequencer::new();
        seq.mark(0).unwrap().release().unwrap();
        seq.mark(1).unwrap().release().unwrap();
        seq.reset().unwrap();
        let mark = seq.mark(0).unwrap();
        assert_eq!(mark.step(), 0);
    }
}
