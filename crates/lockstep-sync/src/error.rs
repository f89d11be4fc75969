// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lock errors.

use thiserror::Error;

/// A failure reported by a lock policy.
///
/// Acquisition failures are returned to the caller; nothing was locked, so
/// the caller can retry. Release failures never surface as this type: they
/// abort the process (see [`crate::policy`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// A previous holder panicked and the policy refuses further access.
    #[error("lock poisoned by a panicking holder")]
    Poisoned,

    /// The underlying mutex reported a failure.
    #[error("lock operation failed: {reason}")]
    Failed { reason: String },
}

impl LockError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}
