//! Starting computations on an executor.
use std::convert::Infallible;

use crate::error::{BoxError, Error};
use crate::executor::{CommonPool, Executor, Task};
use crate::promise::{catch_panic, AbandonGuard, Promise};

/// Runs `f` on the common pool and returns a promise of its value.
///
/// A panic inside `f` fails the promise with a
/// [`PanicError`](crate::PanicError) cause.
///
/// ```
/// use promise_chain::supply_async;
///
/// let future = supply_async(|| "hello");
/// assert_eq!(future.join().unwrap(), "hello");
/// assert!(future.is_done());
/// assert!(!future.is_failed());
/// ```
pub fn supply_async<T, F>(f: F) -> Promise<T>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    supply_async_on(&CommonPool, f)
}

pub fn supply_async_on<T, F, X>(executor: &X, f: F) -> Promise<T>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> T + Send + 'static,
    X: Executor + ?Sized,
{
    try_supply_async_on(executor, move || Ok::<T, Infallible>(f()))
}

/// Runs the fallible `f` on the common pool. An `Err` fails the promise
/// with that error as its cause.
pub fn try_supply_async<T, E, F>(f: F) -> Promise<T>
where
    T: Send + Sync + 'static,
    E: Into<BoxError>,
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
{
    try_supply_async_on(&CommonPool, f)
}

pub fn try_supply_async_on<T, E, F, X>(executor: &X, f: F) -> Promise<T>
where
    T: Send + Sync + 'static,
    E: Into<BoxError>,
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    X: Executor + ?Sized,
{
    let promise = Promise::new();
    let mut guard = AbandonGuard::new(promise.clone());
    let task: Task = Box::new(move || {
        if let Some(target) = guard.disarm() {
            let outcome = catch_panic(f).and_then(|r| r.map_err(Error::computation));
            let _ = target.settle(outcome);
        }
    });
    if let Err(err) = executor.execute(task) {
        let _ = promise.fail(err);
    }
    promise
}

/// Runs the side effect `f` on the common pool.
pub fn run_async<F>(f: F) -> Promise<()>
where
    F: FnOnce() + Send + 'static,
{
    supply_async_on(&CommonPool, f)
}

pub fn run_async_on<F, X>(executor: &X, f: F) -> Promise<()>
where
    F: FnOnce() + Send + 'static,
    X: Executor + ?Sized,
{
    supply_async_on(executor, f)
}
