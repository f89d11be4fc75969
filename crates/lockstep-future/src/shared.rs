// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Read-many futures.

use std::fmt;
use std::sync::Arc;

use lockstep_sync::Readiness;

use crate::error::FutureError;
use crate::future::{failed, run_continuation, Future};
use crate::promise::Promise;
use crate::state::SharedState;

/// A future that can be cloned and read by every clone.
///
/// `get` clones the stored outcome instead of moving it, so values must be
/// `Clone`. Errors are always cloneable.
pub struct SharedFuture<T> {
    state: Option<Arc<SharedState<T>>>,
}

impl<T> SharedFuture<T> {
    pub(crate) fn from_parts(state: Option<Arc<SharedState<T>>>) -> Self {
        Self { state }
    }

    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.is_ready())
    }

    pub fn wait(&self) -> Result<(), FutureError> {
        self.state.as_ref().ok_or(FutureError::NoState)?.wait();
        Ok(())
    }

    /// Blocks until fulfilled, then returns a copy of the outcome.
    pub fn get(&self) -> Result<T, FutureError>
    where
        T: Clone,
    {
        self.state.as_ref().ok_or(FutureError::NoState)?.peek()
    }
}

impl<T: Send + 'static> SharedFuture<T> {
    /// Chains `f` to run with a clone of this future once it is fulfilled.
    ///
    /// Any number of clones may chain; their continuations run in the order
    /// they were added, inline on the fulfilling thread.
    pub fn then<R, F>(&self, f: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(SharedFuture<T>) -> Result<R, FutureError> + Send + 'static,
    {
        let Some(state) = &self.state else {
            return failed(FutureError::NoState);
        };
        let (promise, chained) = Promise::pair();
        state.add_shared_callback(move |ready| {
            promise.complete(run_continuation(f, SharedFuture::from_parts(Some(ready))));
        });
        chained
    }
}

impl<T: Clone + Send + 'static> SharedFuture<T> {
    /// Flattens a future that yields a shared future.
    ///
    /// Same outcomes as `Future::from_nested`: a stateless outer reports
    /// `NoState`, a stateless inner reports `BrokenPromise`, and errors on
    /// either level pass through.
    pub fn from_nested(nested: Future<SharedFuture<T>>) -> Self {
        nested
            .then(|mut outer| {
                let Some(state) = outer.get()?.state else {
                    return Err(FutureError::BrokenPromise);
                };
                let (promise, copy) = Promise::pair();
                state.add_shared_callback(move |inner| promise.complete(inner.peek()));
                Ok(copy)
            })
            .flatten()
            .share()
    }
}

impl<T> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Default for SharedFuture<T> {
    fn default() -> Self {
        Self { state: None }
    }
}

impl<T> From<Future<T>> for SharedFuture<T> {
    fn from(future: Future<T>) -> Self {
        future.share()
    }
}

impl<T> Readiness for SharedFuture<T> {
    fn is_ready(&self) -> bool {
        SharedFuture::is_ready(self)
    }
}

impl<T> fmt::Debug for SharedFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFuture")
            .field("valid", &self.valid())
            .field("ready", &self.is_ready())
            .finish()
    }
}
