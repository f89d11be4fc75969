// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lock-bound values.
//!
//! `Concurrent<T, M>` owns one value and one mutex. Every access goes through
//! the mutex: closure-based (`run_with_lock*`) or through a lock proxy
//! (`acquire_lock*`). Read-only paths take the policy's reader mode when it
//! has one.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem;
use std::ptr;

use crate::error::LockError;
use crate::policy::{self, AccessMode, DefaultMutex, LockPolicy, ReadOnly, ReadWrite, SyncUnder};
use crate::proxy::LockGuardProxy;
use crate::wakeup::Wakeups;

/// A value that can only be reached while its mutex is held.
pub struct Concurrent<T, M: LockPolicy = DefaultMutex> {
    mutex: M,
    wakeups: Wakeups,
    value: UnsafeCell<T>,
}

// Safety: the value moves with the wrapper.
unsafe impl<T: Send, M: LockPolicy> Send for Concurrent<T, M> {}
// Safety: without a reader mode one thread at a time reaches the value, so
// `T: Send` suffices, as for `std::sync::Mutex`. Reader modes hand out `&T`
// to several threads at once and add `T: Sync` through `SyncUnder`.
unsafe impl<T, M> Sync for Concurrent<T, M>
where
    T: Send + SyncUnder<M::Readers>,
    M: LockPolicy,
{
}

impl<T> Concurrent<T> {
    /// Wraps `value` behind the default mutex. The mutex is not touched.
    pub fn new(value: T) -> Self {
        Self::with_policy(value)
    }
}

impl<T, M: LockPolicy> Concurrent<T, M> {
    /// Wraps `value` behind a fresh `M`.
    pub fn with_policy(value: T) -> Self {
        Self {
            mutex: M::default(),
            wakeups: Wakeups::new(),
            value: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    /// Direct access through a unique borrow; no lock needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Runs `f` under the exclusive lock.
    ///
    /// If `f` panics the lock is released and the panic continues.
    pub fn run_with_lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> Result<R, LockError> {
        let mut proxy = self.acquire_lock()?;
        Ok(f(&mut *proxy))
    }

    /// Runs `f` under the read-only lock (shared when the policy allows).
    pub fn run_with_lock_shared<R, F: FnOnce(&T) -> R>(&self, f: F) -> Result<R, LockError> {
        let proxy = self.acquire_lock_shared()?;
        Ok(f(&*proxy))
    }

    /// Non-blocking `run_with_lock`; `None` if the lock is taken.
    pub fn try_run_with_lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> Option<R> {
        let mut proxy = self.try_acquire::<ReadWrite>()?;
        Some(f(&mut *proxy))
    }

    pub fn try_run_with_lock_shared<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R> {
        let proxy = self.try_acquire::<ReadOnly>()?;
        Some(f(&*proxy))
    }

    /// Exclusive lock proxy.
    pub fn acquire_lock(&self) -> Result<LockGuardProxy<'_, T, M, ReadWrite>, LockError> {
        self.acquire()
    }

    /// Read-only lock proxy.
    pub fn acquire_lock_shared(&self) -> Result<LockGuardProxy<'_, T, M, ReadOnly>, LockError> {
        self.acquire()
    }

    /// Lock proxy in the mode named by `A`.
    pub fn acquire<A: AccessMode>(&self) -> Result<LockGuardProxy<'_, T, M, A>, LockError> {
        policy::acquire(&self.mutex, A::ACCESS)?;
        Ok(LockGuardProxy::locked(self))
    }

    pub fn try_acquire<A: AccessMode>(&self) -> Option<LockGuardProxy<'_, T, M, A>> {
        if policy::try_acquire(&self.mutex, A::ACCESS) {
            Some(LockGuardProxy::locked(self))
        } else {
            None
        }
    }

    /// Copies the value out under a read-only lock into a fresh wrapper.
    pub fn try_clone(&self) -> Result<Self, LockError>
    where
        T: Clone,
    {
        Ok(Self::with_policy(self.run_with_lock_shared(T::clone)?))
    }

    /// Moves `other`'s value into a fresh wrapper, leaving `T::default()`.
    pub fn take_from(other: &Self) -> Result<Self, LockError>
    where
        T: Default,
    {
        Ok(Self::with_policy(other.run_with_lock(mem::take)?))
    }

    /// Copy assignment: `self = other`, holding both locks. `other` is
    /// held read-only.
    pub fn assign_from(&self, other: &Self) -> Result<(), LockError>
    where
        T: Clone,
    {
        if ptr::eq(self, other) {
            return Ok(());
        }
        let (mut dst, src) = self.lock_pair::<ReadOnly>(other)?;
        dst.clone_from(&*src);
        Ok(())
    }

    /// Move assignment: `self = other`, leaving `T::default()` in `other`.
    pub fn move_assign_from(&self, other: &Self) -> Result<(), LockError>
    where
        T: Default,
    {
        if ptr::eq(self, other) {
            return Ok(());
        }
        let (mut dst, mut src) = self.lock_pair::<ReadWrite>(other)?;
        *dst = mem::take(&mut *src);
        Ok(())
    }

    pub fn swap(&self, other: &Self) -> Result<(), LockError> {
        if ptr::eq(self, other) {
            return Ok(());
        }
        let (mut a, mut b) = self.lock_pair::<ReadWrite>(other)?;
        mem::swap(&mut *a, &mut *b);
        Ok(())
    }

    /// Locks `self` exclusively and `other` in mode `B`, lower address
    /// first. `self` and `other` must be distinct.
    fn lock_pair<'a, B: AccessMode>(
        &'a self,
        other: &'a Self,
    ) -> Result<(LockGuardProxy<'a, T, M, ReadWrite>, LockGuardProxy<'a, T, M, B>), LockError> {
        debug_assert!(!ptr::eq(self, other));
        if (self as *const Self) < (other as *const Self) {
            let mine = self.acquire_lock()?;
            let theirs = other.acquire::<B>()?;
            Ok((mine, theirs))
        } else {
            let theirs = other.acquire::<B>()?;
            let mine = self.acquire_lock()?;
            Ok((mine, theirs))
        }
    }

    pub(crate) fn mutex(&self) -> &M {
        &self.mutex
    }

    pub(crate) fn wakeups(&self) -> &Wakeups {
        &self.wakeups
    }

    pub(crate) fn data_ptr(&self) -> *mut T {
        self.value.get()
    }
}

impl<T: Default, M: LockPolicy> Default for Concurrent<T, M> {
    fn default() -> Self {
        Self::with_policy(T::default())
    }
}

impl<T, M: LockPolicy> From<T> for Concurrent<T, M> {
    fn from(value: T) -> Self {
        Self::with_policy(value)
    }
}

impl<T: Clone, M: LockPolicy> Clone for Concurrent<T, M> {
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(copy) => copy,
            Err(err) => panic!("cannot clone Concurrent value: {err}"),
        }
    }
}

impl<T: fmt::Debug, M: LockPolicy> fmt::Debug for Concurrent<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Concurrent");
        match self.try_acquire::<ReadOnly>() {
            Some(proxy) => d.field("value", &*proxy),
            None => d.field("value", &format_args!("<locked>")),
        };
        d.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DefaultRwLock;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts which mode each acquisition used.
    #[derive(Default)]
    struct Counting<M> {
        inner: M,
        exclusive: AtomicUsize,
        shared: AtomicUsize,
        fail: AtomicBool,
    }

    unsafe impl<M: LockPolicy> LockPolicy for Counting<M> {
        type Readers = M::Readers;

        fn lock(&self) -> Result<(), LockError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(LockError::failed("injected"));
            }
            self.exclusive.fetch_add(1, Ordering::SeqCst);
            self.inner.lock()
        }

        fn try_lock(&self) -> bool {
            self.inner.try_lock()
        }

        unsafe fn unlock(&self) -> Result<(), LockError> {
            self.inner.unlock()
        }

        fn lock_shared(&self) -> Result<(), LockError> {
            self.shared.fetch_add(1, Ordering::SeqCst);
            self.inner.lock_shared()
        }

        fn try_lock_shared(&self) -> bool {
            self.inner.try_lock_shared()
        }

        unsafe fn unlock_shared(&self) -> Result<(), LockError> {
            self.inner.unlock_shared()
        }
    }

    #[test]
    fn closure_result_passes_through() {
        let c = Concurrent::new(vec![3, 1, 2]);
        let max = c
            .run_with_lock(|v| {
                v.sort();
                v.last().copied()
            })
            .unwrap();
        assert_eq!(max, Some(3));
        assert_eq!(c.run_with_lock_shared(|v| v.clone()).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn try_acquire_in_either_mode_when_free() {
        let c = Concurrent::new(42);
        let reader = c.try_acquire::<ReadOnly>().expect("free lock");
        assert_eq!(*reader, 42);
        drop(reader);
        let mut writer = c.try_acquire::<ReadWrite>().expect("free lock");
        *writer += 1;
        drop(writer);
        assert_eq!(c.try_run_with_lock_shared(|v| *v), Some(43));
    }

    #[test]
    fn try_lock_fails_while_held() {
        let c = Concurrent::<i32>::new(42);
        let _held = c.acquire_lock().unwrap();
        assert_eq!(c.try_run_with_lock(|v| *v), None);
        assert_eq!(c.try_run_with_lock_shared(|v| *v), None);
    }

    #[test]
    fn shared_readers_coexist_on_rwlock() {
        let c = Concurrent::<i32, DefaultRwLock>::with_policy(7);
        let _reader = c.acquire_lock_shared().unwrap();
        assert_eq!(c.try_run_with_lock_shared(|v| *v), Some(7));
        assert_eq!(c.try_run_with_lock(|v| *v), None);
    }

    #[test]
    fn read_only_uses_reader_mode_when_available() {
        let c = Concurrent::<i32, Counting<DefaultRwLock>>::with_policy(1);
        c.run_with_lock_shared(|v| *v).unwrap();
        c.run_with_lock(|v| *v += 1).unwrap();
        assert_eq!(c.mutex.shared.load(Ordering::SeqCst), 1);
        assert_eq!(c.mutex.exclusive.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_only_falls_back_to_exclusive() {
        let c = Concurrent::<i32, Counting<DefaultMutex>>::with_policy(1);
        c.run_with_lock_shared(|v| *v).unwrap();
        assert_eq!(c.mutex.shared.load(Ordering::SeqCst), 0);
        assert_eq!(c.mutex.exclusive.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lock_failure_propagates() {
        let c = Concurrent::<i32, Counting<DefaultMutex>>::with_policy(1);
        c.mutex.fail.store(true, Ordering::SeqCst);
        let err = c.run_with_lock(|v| *v).unwrap_err();
        assert_eq!(err, LockError::failed("injected"));
        c.mutex.fail.store(false, Ordering::SeqCst);
        assert_eq!(c.run_with_lock(|v| *v).unwrap(), 1);
    }

    #[test]
    fn panic_in_critical_section_releases() {
        let c = Arc::new(Concurrent::<i32>::new(0));
        let c2 = c.clone();
        let result = std::thread::spawn(move || {
            c2.run_with_lock(|_| panic!("boom")).unwrap();
        })
        .join();
        assert!(result.is_err());
        assert_eq!(c.try_run_with_lock(|v| *v), Some(0));
    }

    #[test]
    fn proxies_serialize_writers() {
        let c = Arc::new(Concurrent::new(Vec::<usize>::new()));
        let writers: Vec<_> = (0..4)
            .map(|id| {
                let c = c.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let mut log = c.acquire_lock().unwrap();
                        // Two pushes under one hold stay adjacent.
                        log.push(id);
                        log.push(id);
                    }
                })
            })
            .collect();

        let mut reader = c.acquire_lock_shared().unwrap();
        reader.wait(|log| log.len() == 400).unwrap();
        assert!(reader.chunks(2).all(|pair| pair[0] == pair[1]));
        drop(reader);
        for w in writers {
            w.join().unwrap();
        }
    }

    #[test]
    fn rwlock_readers_wait_out_writers() {
        const WRITERS: i32 = 5;
        let c = Arc::new(Concurrent::<i32, DefaultRwLock>::with_policy(0));
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let c = c.clone();
                std::thread::spawn(move || {
                    let mut proxy = c.acquire_lock_shared().unwrap();
                    proxy.wait(|v| *v == WRITERS).unwrap();
                    *proxy
                })
            })
            .collect();
        let writers: Vec<_> = (0..WRITERS)
            .map(|_| {
                let c = c.clone();
                std::thread::spawn(move || c.run_with_lock(|v| *v += 1).unwrap())
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        for r in readers {
            assert_eq!(r.join().unwrap(), WRITERS);
        }
    }

    #[test]
    fn exclusive_policy_needs_only_send() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<Concurrent<std::cell::Cell<i32>>>();
        assert_sync::<Concurrent<Box<dyn FnMut() + Send>>>();
        assert_sync::<Concurrent<i32, DefaultRwLock>>();

        let c = Arc::new(Concurrent::new(std::cell::Cell::new(0)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = c.clone();
                std::thread::spawn(move || {
                    c.run_with_lock(|cell| cell.set(cell.get() + 1)).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.run_with_lock_shared(|cell| cell.get()).unwrap(), 4);
    }

    #[test]
    fn failed_relock_leaves_proxy_unlocked() {
        let c = Arc::new(Concurrent::<bool, Counting<DefaultMutex>>::with_policy(false));
        let waiter = {
            let c = c.clone();
            std::thread::spawn(move || {
                let mut proxy = c.acquire_lock().unwrap();
                let result = proxy.wait(|v| *v);
                (result, proxy.is_locked())
            })
        };
        while c.wakeups().waiting() == 0 {
            std::thread::yield_now();
        }
        // The write wakes the waiter; its relock then hits the switch.
        c.run_with_lock(|v| {
            *v = true;
            c.mutex.fail.store(true, Ordering::SeqCst);
        })
        .unwrap();

        let (result, locked) = waiter.join().unwrap();
        assert_eq!(result, Err(LockError::failed("injected")));
        assert!(!locked);

        // Nothing is left held: the lock is free once the switch is off.
        c.mutex.fail.store(false, Ordering::SeqCst);
        assert!(c.try_run_with_lock(|v| *v).unwrap());
    }

    #[test]
    fn clone_is_independent() {
        let a = Concurrent::<Vec<i32>>::new(vec![1, 2]);
        let b = a.clone();
        b.run_with_lock(|v| v.push(3)).unwrap();
        assert_eq!(a.into_inner(), vec![1, 2]);
        assert_eq!(b.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn take_from_leaves_default() {
        let a = Concurrent::<String>::new("moved".into());
        let b = Concurrent::take_from(&a).unwrap();
        assert_eq!(b.into_inner(), "moved");
        assert_eq!(a.into_inner(), "");
    }

    #[test]
    fn assignment_variants() {
        let a = Concurrent::<String>::new("a".into());
        let b = Concurrent::<String>::new("b".into());
        a.assign_from(&b).unwrap();
        assert_eq!(a.run_with_lock_shared(|v| v.clone()).unwrap(), "b");

        b.run_with_lock(|v| v.push('!')).unwrap();
        a.move_assign_from(&b).unwrap();
        assert_eq!(a.run_with_lock_shared(|v| v.clone()).unwrap(), "b!");
        assert_eq!(b.run_with_lock_shared(|v| v.clone()).unwrap(), "");
    }

    #[test]
    fn copy_assignment_reads_source_shared() {
        let a = Concurrent::<i32, Counting<DefaultRwLock>>::with_policy(1);
        let b = Concurrent::<i32, Counting<DefaultRwLock>>::with_policy(2);
        a.assign_from(&b).unwrap();
        assert_eq!(b.mutex.shared.load(Ordering::SeqCst), 1);
        assert_eq!(b.mutex.exclusive.load(Ordering::SeqCst), 0);
        assert_eq!(a.mutex.exclusive.load(Ordering::SeqCst), 1);
        assert_eq!(a.into_inner(), 2);
    }

    #[test]
    fn self_assignment_is_noop() {
        let a = Concurrent::<i32>::new(3);
        a.assign_from(&a).unwrap();
        a.swap(&a).unwrap();
        assert_eq!(a.into_inner(), 3);
    }

    #[test]
    fn opposite_order_swaps_do_not_deadlock() {
        let a = Arc::new(Concurrent::<i32>::new(1));
        let b = Arc::new(Concurrent::<i32>::new(2));
        let mut handles = vec![];
        for flip in [false, true] {
            let (a, b) = (a.clone(), b.clone());
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    if flip {
                        b.swap(&a).unwrap();
                    } else {
                        a.swap(&b).unwrap();
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // 2000 swaps in total: back where we started.
        assert_eq!(a.run_with_lock_shared(|v| *v).unwrap(), 1);
        assert_eq!(b.run_with_lock_shared(|v| *v).unwrap(), 2);
    }

    #[test]
    fn debug_shows_value_or_locked() {
        let c = Concurrent::<i32>::new(9);
        assert_eq!(format!("{c:?}"), "Concurrent { value: 9 }");
        let _held = c.acquire_lock().unwrap();
        assert_eq!(format!("{c:?}"), "Concurrent { value: <locked> }");
    }
}
