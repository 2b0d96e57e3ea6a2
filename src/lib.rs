//! Composable single-assignment promises.
//!
//! A [`Promise`] holds the eventual outcome of a computation: pending at
//! first, then completed once with a value or with an [`Error`]. Promises
//! are started on an [`Executor`] with [`supply_async`] or [`run_async`],
//! chained with [`Promise::map`], [`Promise::flat_map`] and friends,
//! aggregated with [`all_of`] and [`any_of`], and bounded in time with
//! [`Promise::or_timeout`] and [`Promise::complete_on_timeout`].
//!
//! Results are read by blocking with [`Promise::join`] or
//! [`Promise::get_timeout`], or by awaiting the promise from any async
//! executor.
//!
//! # Examples
//!
//! ```
//! use promise_chain::{supply_async, ThreadPool};
//!
//! let worker = ThreadPool::single("worker-").unwrap();
//! let continuation = ThreadPool::single("continuation-").unwrap();
//!
//! let chain = promise_chain::supply_async_on(&worker, || {
//!     std::thread::current().name().unwrap_or_default().to_owned()
//! })
//! .map_async(&continuation, |name| {
//!     format!("{name}->{}", std::thread::current().name().unwrap_or_default())
//! });
//!
//! assert_eq!(chain.join().unwrap(), "worker-0->continuation-0");
//! assert_eq!(supply_async(|| 5).flat_map(|v| supply_async(move || v + 7)).join().unwrap(), 12);
//! ```
pub mod aggregate;
mod combinator;
pub mod error;
pub mod executor;
pub mod promise;
pub mod spawn;
mod timer;

pub use aggregate::{all_of, any_of};
pub use error::{BoxError, Cause, Error, PanicError, Result};
pub use executor::{
    CommonPool, Executor, Inline, ShutdownPolicy, Task, ThreadPool, ThreadPoolBuilder,
};
pub use promise::{Outcome, Promise};
pub use spawn::{
    run_async, run_async_on, supply_async, supply_async_on, try_supply_async,
    try_supply_async_on,
};
