//! Chaining combinators.
//!
//! Every combinator returns a new promise immediately. The plain variants
//! run their closure on whichever thread completes the upstream promise (or
//! on the calling thread if it is already done); the `_async` variants
//! submit the closure to an [`Executor`] instead. Failures flow through
//! `map`, `flat_map`, `consume` and `run` untouched until a `recover` or
//! `handle` step intercepts them.
use std::sync::Arc;

use crate::error::{BoxError, Error, Result};
use crate::executor::Executor;
use crate::promise::{catch_panic, AbandonGuard, Promise};

/// Where a continuation runs.
#[derive(Clone)]
pub(crate) enum Via {
    Inline,
    Executor(Arc<dyn Executor>),
}

impl Via {
    pub(crate) fn on<E: Executor + Clone + 'static>(executor: &E) -> Self {
        Via::Executor(Arc::new(executor.clone()))
    }

    /// Runs `job` against `target`, failing `target` if the executor refuses
    /// or drops it.
    fn run<U, F>(&self, target: Promise<U>, job: F)
    where
        U: Send + Sync + 'static,
        F: FnOnce(&Promise<U>) + Send + 'static,
    {
        match self {
            Via::Inline => job(&target),
            Via::Executor(executor) => {
                let mut guard = AbandonGuard::new(target.clone());
                let task = Box::new(move || {
                    if let Some(downstream) = guard.disarm() {
                        job(&downstream);
                    }
                });
                if let Err(err) = executor.execute(task) {
                    let _ = target.fail(err);
                }
            }
        }
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Runs `job` with the upstream value; an upstream failure is copied to
    /// the downstream promise without running `job`.
    fn then_value<U, F>(&self, via: Via, job: F) -> Promise<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(T, &Promise<U>) + Send + 'static,
    {
        let downstream = Promise::new();
        let target = downstream.clone();
        self.on_complete(move |outcome| match &**outcome {
            Ok(value) => {
                let value = value.clone();
                via.run(target, move |target| job(value, target));
            }
            Err(err) => {
                let _ = target.fail(err.clone());
            }
        });
        downstream
    }

    /// Runs `job` with whatever outcome the upstream promise reached.
    fn then_outcome<U, F>(&self, via: Via, job: F) -> Promise<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(Result<T>, &Promise<U>) + Send + 'static,
    {
        let downstream = Promise::new();
        let target = downstream.clone();
        self.on_complete(move |outcome| {
            let outcome = (**outcome).clone();
            via.run(target, move |target| job(outcome, target));
        });
        downstream
    }

    fn map_via<U, F>(&self, via: Via, f: F) -> Promise<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then_value(via, move |value, target| {
            let _ = target.settle(catch_panic(|| f(value)));
        })
    }

    fn flat_map_via<U, F>(&self, via: Via, f: F) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.then_value(via, move |value, target| match catch_panic(|| f(value)) {
            Ok(inner) => inner.forward_to(target.clone()),
            Err(err) => {
                let _ = target.fail(err);
            }
        })
    }

    /// Transforms the value on the completing thread.
    ///
    /// ```
    /// use promise_chain::supply_async;
    ///
    /// let doubled = supply_async(|| 10).map(|v| v * 2);
    /// assert_eq!(doubled.join().unwrap(), 20);
    /// ```
    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map_via(Via::Inline, f)
    }

    /// Transforms the value as a task submitted to `executor`.
    pub fn map_async<U, F, E>(&self, executor: &E, f: F) -> Promise<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
        E: Executor + Clone + 'static,
    {
        self.map_via(Via::on(executor), f)
    }

    /// Like [`Promise::map`] but the transform may fail; its error becomes
    /// the cause of the downstream failure.
    pub fn try_map<U, F, E>(&self, f: F) -> Promise<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(T) -> std::result::Result<U, E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.then_value(Via::Inline, move |value, target| {
            let outcome = catch_panic(|| f(value)).and_then(|r| r.map_err(Error::computation));
            let _ = target.settle(outcome);
        })
    }

    /// Chains a step that itself produces a promise, without nesting.
    ///
    /// ```
    /// use promise_chain::supply_async;
    ///
    /// let flattened = supply_async(|| 5).flat_map(|v| supply_async(move || v + 7));
    /// assert_eq!(flattened.join().unwrap(), 12);
    /// ```
    pub fn flat_map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.flat_map_via(Via::Inline, f)
    }

    pub fn flat_map_async<U, F, E>(&self, executor: &E, f: F) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
        E: Executor + Clone + 'static,
    {
        self.flat_map_via(Via::on(executor), f)
    }

    /// Hands the value to `f` and keeps only completion or failure.
    pub fn consume<F>(&self, f: F) -> Promise<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.map_via(Via::Inline, f)
    }

    pub fn consume_async<F, E>(&self, executor: &E, f: F) -> Promise<()>
    where
        F: FnOnce(T) + Send + 'static,
        E: Executor + Clone + 'static,
    {
        self.map_via(Via::on(executor), f)
    }

    /// Runs `f` once the value is there, ignoring it.
    pub fn run<F>(&self, f: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.map_via(Via::Inline, move |_| f())
    }

    pub fn run_async<F, E>(&self, executor: &E, f: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
        E: Executor + Clone + 'static,
    {
        self.map_via(Via::on(executor), move |_| f())
    }

    /// Replaces a failure with the fallback `f` computes from it. A success
    /// passes through unchanged.
    ///
    /// ```
    /// use promise_chain::try_supply_async;
    ///
    /// let failing = try_supply_async(|| Err::<String, _>("boom"));
    /// let recovered = failing.recover(|_| "fallback".into());
    /// assert_eq!(recovered.join().unwrap(), "fallback");
    /// ```
    pub fn recover<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(&Error) -> T + Send + 'static,
    {
        self.then_outcome(Via::Inline, move |outcome, target| {
            let outcome = match outcome {
                Ok(value) => Ok(value),
                Err(err) => catch_panic(|| f(&err)),
            };
            let _ = target.settle(outcome);
        })
    }

    /// Maps either outcome to a new value.
    pub fn handle<U, F>(&self, f: F) -> Promise<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(Result<T>) -> U + Send + 'static,
    {
        self.then_outcome(Via::Inline, move |outcome, target| {
            let _ = target.settle(catch_panic(|| f(outcome)));
        })
    }

    /// Merges this value with `other`'s once both are there.
    ///
    /// If either fails the merged promise fails; this promise's failure
    /// takes precedence when both do.
    pub fn combine<U, V, F>(&self, other: &Promise<U>, f: F) -> Promise<V>
    where
        U: Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let other = other.clone();
        self.flat_map(move |left| other.map(move |right| f(left, right)))
    }
}
