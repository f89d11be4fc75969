// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Readiness capability for the zero-argument wait.

/// Values that can report whether a waiter should stop waiting.
///
/// [`LockGuardProxy::wait_ready`](crate::LockGuardProxy::wait_ready) is only
/// available for protected types implementing this.
pub trait Readiness {
    fn is_ready(&self) -> bool;
}

impl Readiness for bool {
    fn is_ready(&self) -> bool {
        *self
    }
}

impl<T> Readiness for Option<T> {
    fn is_ready(&self) -> bool {
        self.is_some()
    }
}
