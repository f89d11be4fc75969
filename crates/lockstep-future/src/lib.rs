// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! One-shot futures and promises for thread-backed code.
//!
//! A `Promise` fulfils a shared state exactly once, with a value or an
//! error; its `Future` blocks on that state, or chains a continuation with
//! `then` that runs on the fulfilling thread. Dropping an unfulfilled
//! promise breaks the state so no consumer blocks forever.
//!
//! Components:
//! - promise: producer side
//! - future: consumer side, `then`, `flatten`
//! - shared: `SharedFuture`, cloneable read-many futures
//! - executor: where `then_on` continuations run
//! - error: `FutureError` and its codes
//!
//! ```
//! use lockstep_future::Promise;
//!
//! let promise = Promise::<i32>::new();
//! let mut doubled = promise.get_future().unwrap().then(|mut f| Ok(f.get()? * 2));
//! std::thread::spawn(move || promise.set_value(21).unwrap());
//! assert_eq!(doubled.get().unwrap(), 42);
//! ```

pub mod error;
pub mod executor;
pub mod future;
pub mod promise;
pub mod shared;
mod state;

pub use error::{Exception, FutureError, FutureErrorCode};
pub use executor::{Executor, InlineExecutor, Job, ManualExecutor};
pub use future::{failed, ready, Future};
pub use promise::Promise;
pub use shared::SharedFuture;
