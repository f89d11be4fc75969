// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lock policies and access modes.
//!
//! A policy is the raw mutex a [`Concurrent`](crate::Concurrent) owns.
//! `LockPolicy::SHARED` answers "does this mutex have a reader mode?" at
//! compile time. Read-only access takes the reader mode when it exists and
//! falls back to the exclusive mode otherwise; read-write access is always
//! exclusive.
//!
//! Any `lock_api` raw lock plugs in through [`Exclusive`] or
//! [`ReaderWriter`].

use std::fmt;

use lock_api::{RawMutex as RawMutexApi, RawRwLock as RawRwLockApi};

use crate::error::LockError;

/// Exclusive-only default policy.
pub type DefaultMutex = Exclusive<parking_lot::RawMutex>;

/// Reader-writer default policy.
pub type DefaultRwLock = ReaderWriter<parking_lot::RawRwLock>;

/// A raw mutex usable by `Concurrent`.
///
/// # Safety
///
/// Implementors must provide mutual exclusion: while `lock` is held no other
/// `lock` or `lock_shared` may succeed. Shared holds may coexist with each
/// other only when `Readers` is [`ManyReaders`]; with [`SingleHolder`],
/// `lock_shared` must be as exclusive as `lock`.
pub unsafe trait LockPolicy: Default + Send + Sync {
    /// How many threads may hold the lock at once.
    type Readers: ReaderMode;

    /// Whether `lock_shared` is a real reader mode.
    const SHARED: bool = <Self::Readers as ReaderMode>::SHARED;

    /// Blocks until the exclusive mode is held.
    fn lock(&self) -> Result<(), LockError>;

    /// Takes the exclusive mode without blocking.
    fn try_lock(&self) -> bool;

    /// Releases the exclusive mode.
    ///
    /// # Safety
    ///
    /// The exclusive mode must be held by the caller.
    unsafe fn unlock(&self) -> Result<(), LockError>;

    /// Blocks until the reader mode is held.
    fn lock_shared(&self) -> Result<(), LockError> {
        self.lock()
    }

    fn try_lock_shared(&self) -> bool {
        self.try_lock()
    }

    /// Releases the reader mode.
    ///
    /// # Safety
    ///
    /// The reader mode must be held by the caller.
    unsafe fn unlock_shared(&self) -> Result<(), LockError> {
        self.unlock()
    }
}

/// Reader capacity of a policy, at the type level.
pub trait ReaderMode: sealed::Sealed + 'static {
    const SHARED: bool;
}

/// One holder at a time, whatever the access mode.
#[derive(Debug)]
pub enum SingleHolder {}

/// Any number of read-only holders at once.
#[derive(Debug)]
pub enum ManyReaders {}

impl sealed::Sealed for SingleHolder {}
impl sealed::Sealed for ManyReaders {}

impl ReaderMode for SingleHolder {
    const SHARED: bool = false;
}

impl ReaderMode for ManyReaders {
    const SHARED: bool = true;
}

/// Types that may be reached from several threads under reader mode `R`:
/// every type under [`SingleHolder`], `Sync` types under [`ManyReaders`].
pub trait SyncUnder<R: ReaderMode> {}

impl<T: ?Sized> SyncUnder<SingleHolder> for T {}
impl<T: ?Sized + Sync> SyncUnder<ManyReaders> for T {}

/// Compile-time predicate: does `M` have a reader mode?
pub const fn has_shared_mode<M: LockPolicy>() -> bool {
    M::SHARED
}

/// Adapter for any `lock_api::RawMutex`.
pub struct Exclusive<R: RawMutexApi>(R);

impl<R: RawMutexApi> Default for Exclusive<R> {
    fn default() -> Self {
        Self(R::INIT)
    }
}

impl<R: RawMutexApi> fmt::Debug for Exclusive<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exclusive").finish_non_exhaustive()
    }
}

// Safety: delegates to a `lock_api` mutex, which upholds exclusion.
unsafe impl<R: RawMutexApi + Send + Sync> LockPolicy for Exclusive<R> {
    type Readers = SingleHolder;

    fn lock(&self) -> Result<(), LockError> {
        self.0.lock();
        Ok(())
    }

    fn try_lock(&self) -> bool {
        self.0.try_lock()
    }

    unsafe fn unlock(&self) -> Result<(), LockError> {
        self.0.unlock();
        Ok(())
    }
}

/// Adapter for any `lock_api::RawRwLock`.
pub struct ReaderWriter<R: RawRwLockApi>(R);

impl<R: RawRwLockApi> Default for ReaderWriter<R> {
    fn default() -> Self {
        Self(R::INIT)
    }
}

impl<R: RawRwLockApi> fmt::Debug for ReaderWriter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderWriter").finish_non_exhaustive()
    }
}

// Safety: delegates to a `lock_api` reader-writer lock.
unsafe impl<R: RawRwLockApi + Send + Sync> LockPolicy for ReaderWriter<R> {
    type Readers = ManyReaders;

    fn lock(&self) -> Result<(), LockError> {
        self.0.lock_exclusive();
        Ok(())
    }

    fn try_lock(&self) -> bool {
        self.0.try_lock_exclusive()
    }

    unsafe fn unlock(&self) -> Result<(), LockError> {
        self.0.unlock_exclusive();
        Ok(())
    }

    fn lock_shared(&self) -> Result<(), LockError> {
        self.0.lock_shared();
        Ok(())
    }

    fn try_lock_shared(&self) -> bool {
        self.0.try_lock_shared()
    }

    unsafe fn unlock_shared(&self) -> Result<(), LockError> {
        self.0.unlock_shared();
        Ok(())
    }
}

/// How a call site touches the protected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    /// Whether this access holds `M` in its reader mode.
    pub fn is_shared_on<M: LockPolicy>(self) -> bool {
        self == Access::ReadOnly && M::SHARED
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Type-level access mode carried by a lock proxy.
pub trait AccessMode: sealed::Sealed + 'static {
    const ACCESS: Access;
}

/// Read-only marker: shared lock when available.
#[derive(Debug)]
pub enum ReadOnly {}

/// Read-write marker: always exclusive.
#[derive(Debug)]
pub enum ReadWrite {}

impl sealed::Sealed for ReadOnly {}
impl sealed::Sealed for ReadWrite {}

impl AccessMode for ReadOnly {
    const ACCESS: Access = Access::ReadOnly;
}

impl AccessMode for ReadWrite {
    const ACCESS: Access = Access::ReadWrite;
}

pub(crate) fn acquire<M: LockPolicy>(mutex: &M, access: Access) -> Result<(), LockError> {
    if access.is_shared_on::<M>() {
        mutex.lock_shared()
    } else {
        mutex.lock()
    }
}

pub(crate) fn try_acquire<M: LockPolicy>(mutex: &M, access: Access) -> bool {
    if access.is_shared_on::<M>() {
        mutex.try_lock_shared()
    } else {
        mutex.try_lock()
    }
}

/// Releases a hold taken by `acquire`. A failed unlock leaves the mutex in
/// no defined state, so the process aborts.
///
/// # Safety
///
/// `mutex` must be held in the mode `access` maps to.
pub(crate) unsafe fn release<M: LockPolicy>(mutex: &M, access: Access) {
    let result = if access.is_shared_on::<M>() {
        mutex.unlock_shared()
    } else {
        mutex.unlock()
    };
    if let Err(err) = result {
        tracing::error!(%err, ?access, "mutex unlock failed; aborting");
        std::process::abort();
    }
}
