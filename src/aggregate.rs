//! Waiting on many promises at once.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::Error;
use crate::promise::Promise;

struct AllOf {
    total: usize,
    remaining: AtomicUsize,
    failed: AtomicUsize,
    first_failure: Mutex<Option<Error>>,
}

/// A promise that completes once every input is done.
///
/// It never finishes early: when an input fails, the aggregate still waits
/// for the rest, then fails with [`Error::Aggregate`] carrying the first
/// failure observed and the number of failed inputs. No inputs means
/// already complete. Values are read from the inputs themselves.
///
/// ```
/// use promise_chain::{all_of, supply_async};
///
/// let first = supply_async(|| "A");
/// let second = supply_async(|| "B");
/// all_of([&first, &second]).join().unwrap();
/// assert_eq!(first.join().unwrap().to_owned() + second.join().unwrap(), "AB");
/// ```
pub fn all_of<'a, T, I>(promises: I) -> Promise<()>
where
    T: Send + Sync + 'static,
    I: IntoIterator<Item = &'a Promise<T>>,
{
    let promises: Vec<&Promise<T>> = promises.into_iter().collect();
    let all = Promise::new();
    if promises.is_empty() {
        let _ = all.complete(());
        return all;
    }

    let state = Arc::new(AllOf {
        total: promises.len(),
        remaining: AtomicUsize::new(promises.len()),
        failed: AtomicUsize::new(0),
        first_failure: Mutex::new(None),
    });
    for promise in promises {
        let state = state.clone();
        let all = all.clone();
        promise.on_complete(move |outcome| {
            if let Err(err) = &**outcome {
                state.failed.fetch_add(1, Ordering::AcqRel);
                state.first_failure.lock().get_or_insert_with(|| err.clone());
            }
            if state.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
                return;
            }
            let result = match state.first_failure.lock().take() {
                None => Ok(()),
                Some(first) => Err(Error::Aggregate {
                    failed: state.failed.load(Ordering::Acquire),
                    total: state.total,
                    first: Box::new(first),
                }),
            };
            trace!(total = state.total, ok = result.is_ok(), "all_of settled");
            let _ = all.settle(result);
        });
    }
    all
}

/// A promise that takes the outcome, success or failure, of whichever input
/// finishes first.
///
/// The slower inputs keep running; their outcomes are dropped. Inputs that
/// are already done win in iteration order. With no inputs the result stays
/// pending.
pub fn any_of<'a, T, I>(promises: I) -> Promise<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = &'a Promise<T>>,
{
    let any = Promise::new();
    for promise in promises {
        promise.forward_to(any.clone());
    }
    any
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_all_of_is_complete() {
        let none: [&Promise<u8>; 0] = [];
        let all = all_of(none);
        assert!(all.is_done());
        all.join().unwrap();
    }

    #[test]
    fn all_of_waits_for_the_last_input() {
        let a = Promise::<u8>::new();
        let b = Promise::<u8>::new();
        let all = all_of([&a, &b]);
        a.complete(1).unwrap();
        assert!(!all.is_done());
        b.complete(2).unwrap();
        assert!(all.is_done());
    }

    #[test]
    fn all_of_waits_even_after_a_failure() {
        let a = Promise::<u8>::new();
        let b = Promise::<u8>::new();
        let c = Promise::<u8>::new();
        let all = all_of([&a, &b, &c]);
        b.complete_exceptionally("b broke").unwrap();
        assert!(!all.is_done());
        c.complete_exceptionally("c broke").unwrap();
        a.complete(0).unwrap();
        match all.join().unwrap_err() {
            Error::Aggregate {
                failed,
                total,
                first,
            } => {
                assert_eq!((failed, total), (2, 3));
                assert_eq!(first.to_string(), "computation failed: b broke");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn any_of_takes_first_outcome() {
        let slow = Promise::<&str>::new();
        let fast = Promise::<&str>::new();
        let any = any_of([&slow, &fast]);
        fast.complete("fast").unwrap();
        slow.complete("slow").unwrap();
        assert_eq!(any.join().unwrap(), "fast");
    }

    #[test]
    fn any_of_forwards_a_failure_verbatim() {
        let slow = Promise::<u8>::new();
        let fast = Promise::<u8>::new();
        let any = any_of([&slow, &fast]);
        fast.fail(Error::Timeout(Duration::from_secs(1))).unwrap();
        slow.complete(1).unwrap();
        assert!(any.join().unwrap_err().is_timeout());
    }

    #[test]
    fn empty_any_of_stays_pending() {
        let none: Vec<Promise<u8>> = vec![];
        let any = any_of(&none);
        assert!(any.get_timeout(Duration::from_millis(10)).is_err());
        assert!(!any.is_done());
    }
}
