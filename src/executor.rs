//! Executors accept units of work and run them somewhere: inline on the
//! submitting thread, or on the workers of a [`ThreadPool`].
//!
//! Promises never assume more of an executor than "the task eventually
//! runs", so any implementation of [`Executor`] can drive the combinators.
//!
//! # Examples
//!
//! ```
//! use promise_chain::{supply_async_on, ThreadPool};
//!
//! let pool = ThreadPool::builder().threads(2).name_prefix("worker-").build().unwrap();
//! let name = supply_async_on(&pool, || std::thread::current().name().map(str::to_owned));
//! assert!(name.join().unwrap().unwrap().starts_with("worker-"));
//! pool.shutdown();
//! ```
use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{Error, PanicError, Result};

/// A unit of work handed to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Anything that can run a [`Task`].
pub trait Executor: Send + Sync {
    /// Submits `task`. An error means the task was dropped without running.
    fn execute(&self, task: Task) -> Result<()>;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, task: Task) -> Result<()> {
        (**self).execute(task)
    }
}

impl<E: Executor + ?Sized> Executor for &E {
    fn execute(&self, task: Task) -> Result<()> {
        (**self).execute(task)
    }
}

/// Runs every task immediately on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, task: Task) -> Result<()> {
        task();
        Ok(())
    }
}

/// What happens to queued tasks when a [`ThreadPool`] shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Workers finish everything already queued, then exit.
    #[default]
    Drain,
    /// Queued tasks are dropped without running; the promises they would
    /// have completed fail with [`Error::ExecutorShutdown`].
    Abandon,
}

/// A builder object that can be used to configure and spawn a [`ThreadPool`].
#[derive(Debug, Clone)]
pub struct ThreadPoolBuilder {
    threads: usize,
    name_prefix: String,
    policy: ShutdownPolicy,
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        let threads = thread::available_parallelism().map_or(1, |n| n.get());
        ThreadPoolBuilder {
            threads,
            name_prefix: "promise-worker-".to_owned(),
            policy: ShutdownPolicy::Drain,
        }
    }
}

impl ThreadPoolBuilder {
    /// Sets the number of worker threads. Zero is treated as one.
    pub fn threads(self, threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            ..self
        }
    }

    /// Sets the prefix of the worker thread names; workers are named
    /// `{prefix}{index}`.
    pub fn name_prefix<N: Into<String>>(self, prefix: N) -> Self {
        Self {
            name_prefix: prefix.into(),
            ..self
        }
    }

    #[inline]
    pub fn shutdown_policy(self, policy: ShutdownPolicy) -> Self {
        Self { policy, ..self }
    }

    /// Spawns the worker threads.
    pub fn build(self) -> Result<ThreadPool> {
        let (sender, receiver) = unbounded::<Task>();
        let shared = Arc::new(Shared {
            name_prefix: self.name_prefix,
            threads: self.threads,
            policy: self.policy,
            sender: Mutex::new(Some(sender)),
            abandoned: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::with_capacity(self.threads)),
        });

        for index in 0..shared.threads {
            let name = format!("{}{}", shared.name_prefix, index);
            let receiver = receiver.clone();
            let abandoned = shared.abandoned.clone();
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(name, receiver, abandoned))
                .map_err(Error::computation)?;
            shared.handles.lock().push(handle);
        }
        debug!(
            prefix = %shared.name_prefix,
            threads = shared.threads,
            "thread pool started"
        );

        Ok(ThreadPool { shared })
    }
}

fn worker_loop(name: String, receiver: Receiver<Task>, abandoned: Arc<AtomicBool>) {
    trace!(worker = %name, "worker starting");
    for task in receiver {
        if abandoned.load(Ordering::Acquire) {
            break;
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
            let err = PanicError::from_payload(payload);
            warn!(worker = %name, error = %err, "task panicked on worker");
        }
    }
    trace!(worker = %name, "worker exiting");
}

/// A fixed-size pool of named worker threads fed by one unbounded queue.
///
/// Handles are cheap to clone and all refer to the same workers. The pool
/// shuts down when [`ThreadPool::shutdown`] is called or the last handle is
/// dropped.
#[derive(Clone)]
pub struct ThreadPool {
    shared: Arc<Shared>,
}

struct Shared {
    name_prefix: String,
    threads: usize,
    policy: ShutdownPolicy,
    sender: Mutex<Option<Sender<Task>>>,
    abandoned: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Returns a builder that can be used to configure and spawn a [`ThreadPool`].
    #[inline]
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::default()
    }

    /// A pool with exactly one worker.
    pub fn single<N: Into<String>>(name_prefix: N) -> Result<ThreadPool> {
        Self::builder().threads(1).name_prefix(name_prefix).build()
    }

    pub fn fixed<N: Into<String>>(threads: usize, name_prefix: N) -> Result<ThreadPool> {
        Self::builder()
            .threads(threads)
            .name_prefix(name_prefix)
            .build()
    }

    pub fn threads(&self) -> usize {
        self.shared.threads
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.sender.lock().is_none()
    }

    /// Stops accepting work and waits for the workers to exit.
    ///
    /// Under [`ShutdownPolicy::Drain`] the queued tasks run first. A worker
    /// calling this on its own pool is not waited for.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl Shared {
    fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        if self.policy == ShutdownPolicy::Abandon {
            self.abandoned.store(true, Ordering::Release);
        }
        drop(sender);

        let handles = std::mem::take(&mut *self.handles.lock());
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!(prefix = %self.name_prefix, "worker thread panicked");
            }
        }
        debug!(prefix = %self.name_prefix, policy = ?self.policy, "thread pool shut down");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Executor for ThreadPool {
    fn execute(&self, task: Task) -> Result<()> {
        let sender = self.shared.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender.send(task).map_err(|_| Error::ExecutorShutdown),
            None => {
                warn!(prefix = %self.shared.name_prefix, "task refused, pool is shut down");
                Err(Error::ExecutorShutdown)
            }
        }
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name_prefix", &self.shared.name_prefix)
            .field("threads", &self.shared.threads)
            .field("policy", &self.shared.policy)
            .finish()
    }
}

static COMMON: OnceLock<Result<ThreadPool>> = OnceLock::new();

/// The process-wide pool used when no executor is named.
///
/// Its workers are started on first use and named `promise-common-{index}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonPool;

impl CommonPool {
    pub fn pool() -> Result<&'static ThreadPool> {
        COMMON
            .get_or_init(|| {
                ThreadPool::builder()
                    .name_prefix("promise-common-")
                    .build()
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl Executor for CommonPool {
    fn execute(&self, task: Task) -> Result<()> {
        Self::pool()?.execute(task)
    }
}
