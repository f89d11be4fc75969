// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Producer side of a future/promise pair.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::error::FutureError;
use crate::future::Future;
use crate::state::SharedState;

/// Creates and fulfils one shared state.
///
/// Dropping a promise that was never fulfilled stores
/// [`FutureError::BrokenPromise`], releasing anyone blocked on its future.
pub struct Promise<T> {
    state: Arc<SharedState<T>>,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            state: SharedState::new(false),
        }
    }

    /// A promise and its future, with the retrieval flag already spent.
    pub(crate) fn pair() -> (Self, Future<T>) {
        let state = SharedState::new(true);
        let future = Future::from_state(Arc::clone(&state));
        (Self { state }, future)
    }

    /// The future for this promise. Only the first call succeeds.
    pub fn get_future(&self) -> Result<Future<T>, FutureError> {
        self.state.test_and_set_retrieved_flag()?;
        Ok(Future::from_state(Arc::clone(&self.state)))
    }

    /// Stores `value`. Any pending continuation runs on this thread before
    /// the call returns.
    pub fn set_value(&self, value: T) -> Result<(), FutureError> {
        self.state.fulfil(Ok(value))
    }

    /// Stores a producer error, delivered to the consumer as
    /// [`FutureError::Exception`].
    pub fn set_exception<E>(&self, error: E) -> Result<(), FutureError>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.set_error(FutureError::exception(error))
    }

    /// Stores any `FutureError`, e.g. one forwarded from another future.
    pub fn set_error(&self, error: FutureError) -> Result<(), FutureError> {
        self.state.fulfil(Err(error))
    }

    pub fn is_satisfied(&self) -> bool {
        self.state.is_ready()
    }

    /// Fulfils an internally paired promise, which nothing else can set.
    pub(crate) fn complete(self, outcome: Result<T, FutureError>) {
        if let Err(err) = self.state.fulfil(outcome) {
            tracing::warn!(%err, "chained result discarded");
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        self.state.abandon();
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("satisfied", &self.is_satisfied())
            .finish()
    }
}
