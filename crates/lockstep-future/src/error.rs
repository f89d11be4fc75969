// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Future and promise errors.
//!
//! Protocol violations (double set, double retrieve, missing state) and
//! producer failures travel on the same channel: a consumer cannot tell a
//! vanished producer from a failed one, and should not need to.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Distinguishing code for protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FutureErrorCode {
    BrokenPromise,
    FutureAlreadyRetrieved,
    PromiseAlreadySatisfied,
    NoState,
}

#[derive(Debug, Clone, Error)]
pub enum FutureError {
    /// The promise was dropped before fulfilling its state.
    #[error("broken promise")]
    BrokenPromise,

    #[error("future already retrieved")]
    FutureAlreadyRetrieved,

    #[error("promise already satisfied")]
    PromiseAlreadySatisfied,

    /// No shared state: default-constructed, moved-from, or already consumed.
    #[error("no associated state")]
    NoState,

    /// A continuation panicked with the given message.
    #[error("continuation panicked: {0}")]
    Panicked(String),

    /// An error stored by the producer.
    #[error(transparent)]
    Exception(#[from] Exception),
}

impl FutureError {
    pub fn exception<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Exception(Exception::new(error))
    }

    pub fn code(&self) -> Option<FutureErrorCode> {
        match self {
            FutureError::BrokenPromise => Some(FutureErrorCode::BrokenPromise),
            FutureError::FutureAlreadyRetrieved => Some(FutureErrorCode::FutureAlreadyRetrieved),
            FutureError::PromiseAlreadySatisfied => Some(FutureErrorCode::PromiseAlreadySatisfied),
            FutureError::NoState => Some(FutureErrorCode::NoState),
            FutureError::Panicked(_) | FutureError::Exception(_) => None,
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked(msg)
    }
}

/// A producer error, shareable between every holder of a future.
#[derive(Clone)]
pub struct Exception(Arc<dyn StdError + Send + Sync + 'static>);

impl Exception {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.0.is::<E>()
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for Exception {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}
