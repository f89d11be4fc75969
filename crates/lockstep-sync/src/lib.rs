// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lock-bound data for thread-backed code.
//!
//! `Concurrent<T, M>` binds a value to the mutex that guards it. Access is
//! closure-based or through an RAII lock proxy; read-only paths take a
//! shared lock when the mutex policy has one. Proxies can wait on a
//! predicate over the value instead of juggling condition variables: every
//! exclusive release wakes all waiters to re-test.
//!
//! Components:
//! - policy: `LockPolicy`, access modes, `lock_api` adapters
//! - concurrent: the `Concurrent` wrapper
//! - proxy: `LockGuardProxy` (unlock, wait, wait_ready)
//! - ready: `Readiness` for the zero-argument wait
//! - sequence: ordered marks for multithreaded tests
//!
//! ```
//! use std::sync::Arc;
//! use lockstep_sync::Concurrent;
//!
//! let counter = Arc::new(Concurrent::<u32>::new(0));
//! let c = counter.clone();
//! let reader = std::thread::spawn(move || {
//!     let mut proxy = c.acquire_lock_shared().unwrap();
//!     proxy.wait(|v| *v >= 1).unwrap();
//!     *proxy
//! });
//! counter.run_with_lock(|v| *v = 1).unwrap();
//! assert_eq!(reader.join().unwrap(), 1);
//! ```

pub mod concurrent;
pub mod error;
pub mod policy;
pub mod proxy;
pub mod ready;
pub mod sequence;
mod wakeup;

pub use concurrent::Concurrent;
pub use error::LockError;
pub use policy::{
    has_shared_mode, Access, AccessMode, DefaultMutex, DefaultRwLock, Exclusive, LockPolicy,
    ManyReaders, ReadOnly, ReadWrite, ReaderMode, ReaderWriter, SingleHolder, SyncUnder,
};
pub use proxy::LockGuardProxy;
pub use ready::Readiness;
pub use sequence::{Mark, Sequencer};
