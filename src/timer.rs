//! Deadline-based completion.
//!
//! A single background thread, `promise-timer`, owns every pending deadline
//! in an ordered map. Cancelling a deadline removes its entry, so a promise
//! that finishes in time leaves nothing behind for the timer to wake up for.
use std::{
    collections::BTreeMap,
    sync::{Arc, OnceLock},
    thread,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::executor::Task;
use crate::promise::{catch_panic, Promise};

type Key = (Instant, u64);

struct Timer {
    state: Mutex<TimerState>,
    changed: Condvar,
}

#[derive(Default)]
struct TimerState {
    entries: BTreeMap<Key, Task>,
    next_id: u64,
}

static TIMER: OnceLock<Result<Arc<Timer>>> = OnceLock::new();

impl Timer {
    fn global() -> Result<&'static Arc<Timer>> {
        TIMER
            .get_or_init(|| {
                let timer = Arc::new(Timer {
                    state: Mutex::new(TimerState::default()),
                    changed: Condvar::new(),
                });
                let worker = timer.clone();
                thread::Builder::new()
                    .name("promise-timer".into())
                    .spawn(move || worker.run())
                    .map_err(Error::computation)?;
                debug!("timer thread started");
                Ok(timer)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    fn run(&self) {
        let mut state = self.state.lock();
        loop {
            let due = take_due(&mut state, Instant::now());
            if !due.is_empty() {
                MutexGuard::unlocked(&mut state, || {
                    for task in due {
                        let _ = catch_panic(task);
                    }
                });
                continue;
            }
            match state.entries.keys().next().map(|&(deadline, _)| deadline) {
                Some(deadline) => {
                    self.changed.wait_until(&mut state, deadline);
                }
                None => self.changed.wait(&mut state),
            }
        }
    }
}

fn take_due(state: &mut TimerState, now: Instant) -> Vec<Task> {
    let mut due = vec![];
    while let Some(entry) = state.entries.first_entry() {
        if entry.key().0 > now {
            break;
        }
        due.push(entry.remove());
    }
    due
}

/// A scheduled deadline that has not fired yet.
#[derive(Debug)]
pub(crate) struct TimerHandle {
    key: Key,
}

impl TimerHandle {
    /// Removes the deadline. Returns false if it already fired.
    pub(crate) fn cancel(&self) -> bool {
        let Ok(timer) = Timer::global() else {
            return false;
        };
        let removed = timer.state.lock().entries.remove(&self.key).is_some();
        if removed {
            timer.changed.notify_one();
        }
        removed
    }
}

/// Runs `task` on the timer thread once `deadline` has passed.
pub(crate) fn schedule(deadline: Instant, task: Task) -> Result<TimerHandle> {
    let timer = Timer::global()?;
    let key = {
        let mut state = timer.state.lock();
        let key = (deadline, state.next_id);
        state.next_id += 1;
        state.entries.insert(key, task);
        key
    };
    timer.changed.notify_one();
    trace!(?deadline, "deadline scheduled");
    Ok(TimerHandle { key })
}

impl<T> Promise<T>
where
    T: Send + Sync + 'static,
{
    /// Fails this promise with [`Error::Timeout`] unless it completes within
    /// `timeout`. Returns a handle to the same promise.
    ///
    /// ```
    /// use promise_chain::Promise;
    /// use std::time::Duration;
    ///
    /// let promise = Promise::<String>::new().or_timeout(Duration::from_millis(100));
    /// assert!(promise.get().unwrap_err().is_timeout());
    /// ```
    pub fn or_timeout(&self, timeout: Duration) -> Promise<T> {
        self.race_deadline(timeout, move || Err(Error::Timeout(timeout)))
    }

    /// Completes this promise with `value` unless it completes on its own
    /// within `timeout`. Returns a handle to the same promise.
    pub fn complete_on_timeout(&self, value: T, timeout: Duration) -> Promise<T> {
        self.race_deadline(timeout, move || Ok(value))
    }

    fn race_deadline<F>(&self, timeout: Duration, fallback: F) -> Promise<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if self.is_done() {
            return self.clone();
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            trace!(?timeout, "deadline out of range, never fires");
            return self.clone();
        };
        let target = self.clone();
        let expire: Task = Box::new(move || {
            if target.settle(fallback()).is_ok() {
                debug!(?timeout, "promise completed by its deadline");
            }
        });
        match schedule(deadline, expire) {
            Ok(handle) => self.on_complete(move |_| {
                handle.cancel();
            }),
            Err(err) => warn!(error = %err, "deadline not scheduled, timer unavailable"),
        }
        self.clone()
    }
}
