// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lock proxies returned by [`Concurrent::acquire_lock`].
//!
//! A proxy holds the lock from construction until `unlock()` or drop, and
//! derefs to the protected value in between. After `unlock()` the proxy no
//! longer points at the value; touching it panics instead of reading
//! unprotected data.
//!
//! Waiters are woken when a read-write proxy that handed out `&mut T`
//! releases. Locking and unlocking without writing wakes nobody, so idle
//! waiters never wake each other.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};

use crate::concurrent::Concurrent;
use crate::error::LockError;
use crate::policy::{self, AccessMode, LockPolicy, ReadWrite};
use crate::ready::Readiness;

/// RAII lock over a [`Concurrent`] value.
///
/// `A` fixes the mode: [`ReadOnly`](crate::ReadOnly) proxies only deref,
/// [`ReadWrite`] proxies also deref mutably.
#[must_use = "the lock is released as soon as the proxy is dropped"]
pub struct LockGuardProxy<'a, T, M: LockPolicy, A: AccessMode> {
    resource: Option<&'a Concurrent<T, M>>,
    // Set once `&mut T` has been handed out since the last broadcast.
    dirty: bool,
    // Raw locks are released on the thread that took them.
    _not_send: PhantomData<*const ()>,
    _mode: PhantomData<fn() -> A>,
}

impl<'a, T, M: LockPolicy, A: AccessMode> LockGuardProxy<'a, T, M, A> {
    /// Wraps an already locked resource.
    pub(crate) fn locked(resource: &'a Concurrent<T, M>) -> Self {
        Self {
            resource: Some(resource),
            dirty: false,
            _not_send: PhantomData,
            _mode: PhantomData,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.resource.is_some()
    }

    /// Releases the lock early. Calling it again is a no-op.
    pub fn unlock(&mut self) {
        if let Some(resource) = self.resource.take() {
            Self::release(resource, mem::take(&mut self.dirty));
        }
    }

    /// Blocks until `predicate` holds for the protected value.
    ///
    /// While the predicate is false the lock is released, the thread sleeps
    /// until some read-write holder releases after writing, and the lock is
    /// retaken in the same mode before re-testing. Writes made through this
    /// proxy before sleeping wake the other waiters. The predicate must not
    /// block.
    ///
    /// On `Err` the proxy is left unlocked.
    pub fn wait<P>(&mut self, mut predicate: P) -> Result<(), LockError>
    where
        P: FnMut(&T) -> bool,
    {
        let resource = self.resource();
        loop {
            // Safety: the lock is held here on every iteration.
            if predicate(unsafe { &*resource.data_ptr() }) {
                return Ok(());
            }

            if mem::take(&mut self.dirty) {
                resource.wakeups().broadcast();
            }
            let ticket = resource.wakeups().register();
            // Safety: held in `A::ACCESS` mode since construction or the
            // previous iteration's reacquire.
            unsafe { policy::release(resource.mutex(), A::ACCESS) };
            ticket.wait();

            if let Err(err) = policy::acquire(resource.mutex(), A::ACCESS) {
                self.resource = None;
                return Err(err);
            }
        }
    }

    /// Waits until the value reports itself ready.
    pub fn wait_ready(&mut self) -> Result<(), LockError>
    where
        T: Readiness,
    {
        self.wait(|value| value.is_ready())
    }

    fn resource(&self) -> &'a Concurrent<T, M> {
        match self.resource {
            Some(resource) => resource,
            None => panic!("LockGuardProxy accessed after unlock()"),
        }
    }

    fn release(resource: &Concurrent<T, M>, dirty: bool) {
        if dirty {
            resource.wakeups().broadcast();
        }
        // Safety: only reached while `resource` is held in `A::ACCESS` mode.
        unsafe { policy::release(resource.mutex(), A::ACCESS) };
    }
}

impl<T, M: LockPolicy, A: AccessMode> Deref for LockGuardProxy<'_, T, M, A> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: `resource()` only returns while the lock is held.
        unsafe { &*self.resource().data_ptr() }
    }
}

impl<T, M: LockPolicy> DerefMut for LockGuardProxy<'_, T, M, ReadWrite> {
    fn deref_mut(&mut self) -> &mut T {
        let resource = self.resource();
        self.dirty = true;
        // Safety: read-write proxies hold the exclusive mode.
        unsafe { &mut *resource.data_ptr() }
    }
}

impl<T, M: LockPolicy, A: AccessMode> Drop for LockGuardProxy<'_, T, M, A> {
    fn drop(&mut self) {
        self.unlock();
    }
}

impl<T: fmt::Debug, M: LockPolicy, A: AccessMode> fmt::Debug for LockGuardProxy<'_, T, M, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("LockGuardProxy");
        d.field("access", &A::ACCESS);
        match self.resource {
            // Safety: locked while `resource` is set.
            Some(resource) => d.field("value", unsafe { &*resource.data_ptr() }),
            None => d.field("value", &format_args!("<unlocked>")),
        };
        d.finish()
    }
}
