// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Consumer side of a future/promise pair, plus chaining and unwrapping.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use lockstep_sync::Readiness;

use crate::error::FutureError;
use crate::executor::Executor;
use crate::promise::Promise;
use crate::shared::SharedFuture;
use crate::state::SharedState;

/// The result of a computation that may not have finished yet.
///
/// A default-constructed future has no state; every blocking call on it
/// reports [`FutureError::NoState`]. `get` consumes the state, so a second
/// `get` reports `NoState` too.
pub struct Future<T> {
    state: Option<Arc<SharedState<T>>>,
}

impl<T> Future<T> {
    pub(crate) fn from_state(state: Arc<SharedState<T>>) -> Self {
        Self { state: Some(state) }
    }

    /// Whether this future still has a shared state.
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    /// Non-blocking: fulfilled with a value or an error.
    pub fn is_ready(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.is_ready())
    }

    /// Blocks until fulfilled, without consuming.
    pub fn wait(&self) -> Result<(), FutureError> {
        self.state()?.wait();
        Ok(())
    }

    /// Blocks until fulfilled, then moves the value out or returns the
    /// stored error. The future is left without state.
    pub fn get(&mut self) -> Result<T, FutureError> {
        let state = self.state.take().ok_or(FutureError::NoState)?;
        state.take()
    }

    /// Converts into a cloneable, read-many future.
    pub fn share(self) -> SharedFuture<T> {
        SharedFuture::from_parts(self.state)
    }

    fn state(&self) -> Result<&Arc<SharedState<T>>, FutureError> {
        self.state.as_ref().ok_or(FutureError::NoState)
    }
}

impl<T: Send + 'static> Future<T> {
    /// Chains `f` to run with this future once it is fulfilled.
    ///
    /// `f` runs inline on whichever thread fulfils this future (or right
    /// away if it already is). Its `Err` return, or a panic inside it,
    /// surfaces from the returned future's `get`. Chaining a future with no
    /// state yields a future that reports `NoState`.
    pub fn then<R, F>(self, f: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(Future<T>) -> Result<R, FutureError> + Send + 'static,
    {
        let Some(state) = self.state else {
            return failed(FutureError::NoState);
        };
        let (promise, chained) = Promise::pair();
        state.add_callback(move |ready| {
            promise.complete(run_continuation(f, Future::from_state(ready)));
        });
        chained
    }

    /// Like `then`, for continuations that return a future; the result is
    /// flattened.
    pub fn flat_then<R, F>(self, f: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(Future<T>) -> Future<R> + Send + 'static,
    {
        self.then(move |ready| Ok(f(ready))).flatten()
    }

    /// Like `then`, but the continuation body is handed to `executor`
    /// instead of running on the fulfilling thread.
    pub fn then_on<E, R, F>(self, executor: Arc<E>, f: F) -> Future<R>
    where
        E: Executor + ?Sized + 'static,
        R: Send + 'static,
        F: FnOnce(Future<T>) -> Result<R, FutureError> + Send + 'static,
    {
        let Some(state) = self.state else {
            return failed(FutureError::NoState);
        };
        let (promise, chained) = Promise::pair();
        state.add_callback(move |ready| {
            tracing::trace!("continuation handed to executor");
            executor.add(Box::new(move || {
                promise.complete(run_continuation(f, Future::from_state(ready)));
            }));
        });
        chained
    }

    /// Flattens a future-of-future.
    ///
    /// Resolves once the outer future and the future it yields both resolve.
    /// An outer value that is itself stateless reports `BrokenPromise`;
    /// errors on either level, including an inner promise dropped
    /// unfulfilled, pass through. An outer future with no state is not
    /// rejected here: the returned future reports `NoState` from `get`. Use
    /// [`Future::try_from_nested`] to reject it up front.
    pub fn from_nested(nested: Future<Future<T>>) -> Self {
        match Self::try_from_nested(nested) {
            Ok(flat) => flat,
            Err(err) => failed(err),
        }
    }

    /// Like `from_nested`, but an outer future with no state is returned as
    /// `Err(NoState)` immediately.
    pub fn try_from_nested(nested: Future<Future<T>>) -> Result<Self, FutureError> {
        let outer = nested.state.ok_or(FutureError::NoState)?;
        let (promise, flat) = Promise::pair();
        outer.add_callback(move |outer| match outer.take() {
            Ok(inner) => match inner.state {
                Some(inner) => {
                    tracing::trace!("outer future resolved; waiting on inner");
                    inner.add_callback(move |inner| promise.complete(inner.take()));
                }
                None => promise.complete(Err(FutureError::BrokenPromise)),
            },
            Err(err) => promise.complete(Err(err)),
        });
        Ok(flat)
    }
}

impl<T: Send + 'static> Future<Future<T>> {
    pub fn flatten(self) -> Future<T> {
        Future::from_nested(self)
    }
}

impl<T> Default for Future<T> {
    fn default() -> Self {
        Self { state: None }
    }
}

impl<T> Readiness for Future<T> {
    fn is_ready(&self) -> bool {
        Future::is_ready(self)
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("valid", &self.valid())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// A future that already holds `value`.
pub fn ready<T>(value: T) -> Future<T> {
    let (promise, future) = Promise::pair();
    promise.complete(Ok(value));
    future
}

/// A future that already holds `error`.
pub fn failed<T>(error: FutureError) -> Future<T> {
    let (promise, future) = Promise::pair();
    promise.complete(Err(error));
    future
}

pub(crate) fn run_continuation<A, R, F>(f: F, ready: A) -> Result<R, FutureError>
where
    F: FnOnce(A) -> Result<R, FutureError>,
{
    match panic::catch_unwind(AssertUnwindSafe(move || f(ready))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(FutureError::from_panic(payload)),
    }
}
