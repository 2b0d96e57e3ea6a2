use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    future::Future,
    mem,
    panic::{catch_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::error::{BoxError, Error, PanicError, Result};

/// The terminal value of a promise, shared by every reader.
pub type Outcome<T> = Arc<Result<T>>;

type Callback<T> = Box<dyn FnOnce(&Outcome<T>) + Send + 'static>;

/// A single-assignment container for the eventual outcome of a computation.
///
/// A `Promise` starts pending and is completed exactly once, either with a
/// value or with an [`Error`]. Handles are cheap to clone; every clone
/// observes the same outcome. Continuations registered with
/// [`Promise::on_complete`] run once, on the thread that completes the
/// promise, or right away on the registering thread if it is already done.
///
/// # Examples
///
/// ```
/// use promise_chain::Promise;
/// use std::thread;
///
/// let promise = Promise::<String>::new();
/// let reader = promise.clone();
/// let task = thread::spawn(move || reader.join());
/// promise.complete("Hi".into()).unwrap();
/// assert_eq!(task.join().unwrap().unwrap(), "Hi");
/// ```
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    done: Condvar,
}

enum State<T> {
    Pending {
        callbacks: Vec<Callback<T>>,
        wakers: Vec<Waker>,
    },
    Done(Outcome<T>),
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Promise {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending {
                    callbacks: vec![],
                    wakers: vec![],
                }),
                done: Condvar::new(),
            }),
        }
    }
}

impl<T> Promise<T> {
    /// A pending promise, to be completed by hand.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(value: T) -> Self {
        Self::settled(Ok(value))
    }

    pub fn failed(err: Error) -> Self {
        Self::settled(Err(err))
    }

    fn settled(outcome: Result<T>) -> Self {
        Promise {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Done(Arc::new(outcome))),
                done: Condvar::new(),
            }),
        }
    }

    /// Registers `callback` to run with the outcome.
    ///
    /// If the promise is already done the callback runs immediately on the
    /// calling thread.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        let outcome = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                State::Done(outcome) => outcome.clone(),
            }
        };
        callback(&outcome);
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.inner.state.lock(), State::Done(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(&*self.inner.state.lock(), State::Done(outcome) if outcome.is_err())
    }

    /// The outcome, if the promise is done. Never blocks.
    pub fn outcome(&self) -> Option<Outcome<T>> {
        match &*self.inner.state.lock() {
            State::Done(outcome) => Some(outcome.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Blocks until the promise is done.
    pub fn wait(&self) -> Outcome<T> {
        let mut state = self.inner.state.lock();
        loop {
            if let State::Done(outcome) = &*state {
                return outcome.clone();
            }
            self.inner.done.wait(&mut state);
        }
    }

    /// Blocks until the promise is done or `deadline` passes.
    pub fn wait_until(&self, deadline: Instant) -> Option<Outcome<T>> {
        let mut state = self.inner.state.lock();
        loop {
            if let State::Done(outcome) = &*state {
                return Some(outcome.clone());
            }
            if self.inner.done.wait_until(&mut state, deadline).timed_out() {
                return match &*state {
                    State::Done(outcome) => Some(outcome.clone()),
                    State::Pending { .. } => None,
                };
            }
        }
    }
}

impl<T: 'static> Promise<T> {
    /// Completes the promise with `value`.
    ///
    /// Returns [`Error::AlreadyCompleted`] if the promise was already done;
    /// the existing outcome is kept.
    pub fn complete(&self, value: T) -> Result<()> {
        self.settle(Ok(value))
    }

    /// Fails the promise with `err` as the cause of a computation failure.
    pub fn complete_exceptionally<E: Into<BoxError>>(&self, err: E) -> Result<()> {
        self.settle(Err(Error::computation(err)))
    }

    /// Fails the promise with `err` as is.
    pub fn fail(&self, err: Error) -> Result<()> {
        self.settle(Err(err))
    }

    /// Moves the promise out of pending, then wakes waiters and runs the
    /// registered continuations outside the lock.
    ///
    /// Continuations that complete further promises nest only up to
    /// `MAX_INLINE_DEPTH`; deeper completions are queued and drained by the
    /// outermost `settle` on this thread, so long chains never grow the stack
    /// without bound.
    pub(crate) fn settle(&self, outcome: Result<T>) -> Result<()> {
        let outcome = Arc::new(outcome);
        let previous = {
            let mut state = self.inner.state.lock();
            if let State::Done(_) = *state {
                trace!("ignoring completion of an already completed promise");
                return Err(Error::AlreadyCompleted);
            }
            mem::replace(&mut *state, State::Done(outcome.clone()))
        };
        trace!(failed = outcome.is_err(), "promise completed");
        self.inner.done.notify_all();

        if let State::Pending { callbacks, wakers } = previous {
            for waker in wakers {
                waker.wake();
            }
            if !callbacks.is_empty() {
                run_continuations(Box::new(move || {
                    for callback in callbacks {
                        let run = AssertUnwindSafe(|| callback(&outcome));
                        if let Err(payload) = catch_unwind(run) {
                            let err = PanicError::from_payload(payload);
                            warn!(error = %err, "promise continuation panicked");
                        }
                    }
                }));
            }
        }
        Ok(())
    }
}

impl<T: Clone> Promise<T> {
    /// Blocks until the promise is done and returns its outcome.
    ///
    /// A failed computation comes back as [`Error::Computation`] whose
    /// source is the original error. Joining again returns the same outcome.
    pub fn join(&self) -> Result<T> {
        (*self.wait()).clone()
    }

    /// Same as [`Promise::join`].
    pub fn get(&self) -> Result<T> {
        self.join()
    }

    /// Like [`Promise::get`] but gives up after `timeout` with
    /// [`Error::Timeout`]. Giving up leaves the promise itself pending.
    ///
    /// A timeout too large to express as a deadline waits without one.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        let outcome = match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => Some(self.wait()),
        };
        match outcome {
            Some(outcome) => (*outcome).clone(),
            None => Err(Error::Timeout(timeout)),
        }
    }

    /// Copies this promise's eventual outcome into `target`.
    pub(crate) fn forward_to(&self, target: Promise<T>)
    where
        T: Send + Sync + 'static,
    {
        self.on_complete(move |outcome| {
            let _ = target.settle((**outcome).clone());
        });
    }
}

/// Awaiting a promise resolves to a copy of its outcome.
impl<T: Clone> Future for Promise<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Done(outcome) => Poll::Ready((**outcome).clone()),
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner.state.lock() {
            State::Pending { callbacks, .. } => f
                .debug_struct("Promise")
                .field("state", &"pending")
                .field("callbacks", &callbacks.len())
                .finish(),
            State::Done(outcome) => match &**outcome {
                Ok(value) => f.debug_struct("Promise").field("value", value).finish(),
                Err(err) => f.debug_struct("Promise").field("error", err).finish(),
            },
        }
    }
}

/// Fails the promise a submitted task was meant to complete if the executor
/// drops the task without running it.
pub(crate) struct AbandonGuard<T: 'static> {
    target: Option<Promise<T>>,
}

impl<T: 'static> AbandonGuard<T> {
    pub(crate) fn new(target: Promise<T>) -> Self {
        AbandonGuard {
            target: Some(target),
        }
    }

    /// Takes the promise back once the task is running.
    pub(crate) fn disarm(&mut self) -> Option<Promise<T>> {
        self.target.take()
    }
}

impl<T: 'static> Drop for AbandonGuard<T> {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            if target.fail(Error::ExecutorShutdown).is_ok() {
                debug!("task dropped before it ran");
            }
        }
    }
}

const MAX_INLINE_DEPTH: usize = 32;

type Continuations = Box<dyn FnOnce()>;

#[derive(Default)]
struct Drain {
    depth: usize,
    queue: VecDeque<Continuations>,
}

thread_local! {
    static DRAIN: RefCell<Drain> = RefCell::new(Drain::default());
}

/// Leaves one level of continuation nesting, even if a continuation unwinds.
struct DepthGuard;

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DRAIN.with(|drain| drain.borrow_mut().depth -= 1);
    }
}

fn run_continuations(job: Continuations) {
    let job = DRAIN.with(|drain| {
        let mut drain = drain.borrow_mut();
        if drain.depth >= MAX_INLINE_DEPTH {
            drain.queue.push_back(job);
            None
        } else {
            drain.depth += 1;
            Some(job)
        }
    });
    let Some(job) = job else {
        return;
    };
    let _guard = DepthGuard;
    let outermost = DRAIN.with(|drain| drain.borrow().depth == 1);
    job();
    if outermost {
        while let Some(next) = DRAIN.with(|drain| drain.borrow_mut().queue.pop_front()) {
            next();
        }
    }
}

/// Runs a user closure, turning a panic into a computation failure.
pub(crate) fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let err = PanicError::from_payload(payload);
        warn!(error = %err, "user closure panicked");
        err.into()
    })
}
