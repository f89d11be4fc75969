// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Shared state between a promise and its future.
//!
//! State machine: Empty -> HasValue | HasException, one way. The atomic flag
//! is written under the internal mutex after the slot, so observing a
//! terminal flag (Acquire) means the payload is visible. Continuations run
//! inline on the fulfilling thread, after the mutex is released.
//!
//! A state read through one `Future` takes one continuation. A state read
//! through `SharedFuture` clones takes one per chained clone, in
//! registration order.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::FutureError;

const EMPTY: u8 = 0;
const HAS_VALUE: u8 = 1;
const HAS_EXCEPTION: u8 = 2;

/// Continuation run once the state turns terminal.
pub(crate) type Callback<T> = Box<dyn FnOnce(Arc<SharedState<T>>) + Send>;

enum Slot<T> {
    Empty,
    Value(T),
    Error(FutureError),
    /// The outcome was moved out by a consumer.
    Consumed,
}

struct Inner<T> {
    slot: Slot<T>,
    callback: Option<Callback<T>>,
    shared_callbacks: Vec<Callback<T>>,
}

pub(crate) struct SharedState<T> {
    state: AtomicU8,
    retrieved: AtomicBool,
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

impl<T> SharedState<T> {
    /// `retrieved` pre-sets the one-shot flag for internally paired futures.
    pub(crate) fn new(retrieved: bool) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(EMPTY),
            retrieved: AtomicBool::new(retrieved),
            inner: Mutex::new(Inner {
                slot: Slot::Empty,
                callback: None,
                shared_callbacks: Vec::new(),
            }),
            ready: Condvar::new(),
        })
    }

    /// Lock-free snapshot: holds a value or an error.
    pub(crate) fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) != EMPTY
    }

    pub(crate) fn test_and_set_retrieved_flag(&self) -> Result<(), FutureError> {
        if self.retrieved.swap(true, Ordering::AcqRel) {
            return Err(FutureError::FutureAlreadyRetrieved);
        }
        Ok(())
    }

    pub(crate) fn wait(&self) {
        if self.is_ready() {
            return;
        }
        let mut inner = self.inner.lock();
        while !self.is_ready() {
            self.ready.wait(&mut inner);
        }
    }

    /// Stores the outcome, wakes waiters, then runs the continuation (if
    /// any) on this thread before returning.
    pub(crate) fn fulfil(self: &Arc<Self>, outcome: Result<T, FutureError>) -> Result<(), FutureError> {
        let (callback, shared_callbacks) = {
            let mut inner = self.inner.lock();
            if !matches!(inner.slot, Slot::Empty) {
                return Err(FutureError::PromiseAlreadySatisfied);
            }
            let next = match outcome {
                Ok(value) => {
                    inner.slot = Slot::Value(value);
                    HAS_VALUE
                }
                Err(err) => {
                    inner.slot = Slot::Error(err);
                    HAS_EXCEPTION
                }
            };
            self.state.store(next, Ordering::Release);
            self.ready.notify_all();
            (inner.callback.take(), mem::take(&mut inner.shared_callbacks))
        };

        if let Some(callback) = callback {
            tracing::trace!("running continuation inline");
            callback(Arc::clone(self));
        }
        if !shared_callbacks.is_empty() {
            tracing::trace!(count = shared_callbacks.len(), "running shared continuations inline");
        }
        for callback in shared_callbacks {
            callback(Arc::clone(self));
        }
        Ok(())
    }

    /// Runs `f` now if terminal, otherwise when the state is fulfilled.
    ///
    /// # Panics
    ///
    /// If a continuation is already pending: each state has one consumer,
    /// and chaining builds a new state per link.
    pub(crate) fn add_callback<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(Arc<Self>) + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            if !self.is_ready() {
                assert!(
                    inner.callback.is_none(),
                    "a continuation is already registered on this future"
                );
                tracing::trace!("continuation stored until fulfilment");
                inner.callback = Some(Box::new(f));
                return;
            }
        }
        f(Arc::clone(self));
    }

    /// Like `add_callback`, without the single-continuation limit. Only for
    /// states read by `SharedFuture`, which never moves the outcome out.
    pub(crate) fn add_shared_callback<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(Arc<Self>) + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            if !self.is_ready() {
                inner.shared_callbacks.push(Box::new(f));
                return;
            }
        }
        f(Arc::clone(self));
    }

    /// Waits, then moves the outcome out. Later calls see `NoState`.
    pub(crate) fn take(&self) -> Result<T, FutureError> {
        self.wait();
        let mut inner = self.inner.lock();
        match mem::replace(&mut inner.slot, Slot::Consumed) {
            Slot::Value(value) => Ok(value),
            Slot::Error(err) => Err(err),
            Slot::Consumed | Slot::Empty => Err(FutureError::NoState),
        }
    }

    /// Waits, then clones the outcome, leaving it in place.
    pub(crate) fn peek(&self) -> Result<T, FutureError>
    where
        T: Clone,
    {
        self.wait();
        let inner = self.inner.lock();
        match &inner.slot {
            Slot::Value(value) => Ok(value.clone()),
            Slot::Error(err) => Err(err.clone()),
            Slot::Consumed | Slot::Empty => Err(FutureError::NoState),
        }
    }

    /// Breaks the state if nobody fulfilled it.
    pub(crate) fn abandon(self: &Arc<Self>) {
        if self.is_ready() {
            return;
        }
        if self.fulfil(Err(FutureError::BrokenPromise)).is_ok() {
            tracing::debug!("promise dropped before fulfilment; state broken");
        }
    }
}
