mod common;

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::thread;

    use super::common::{init_test_logging, thread_name};
    use promise_chain::{supply_async, supply_async_on, try_supply_async, Error, ThreadPool};

    #[derive(Debug, thiserror::Error)]
    #[error("illegal state: {0}")]
    struct IllegalState(&'static str);

    #[test]
    fn supply_async_result_is_joined() {
        init_test_logging();
        let future = supply_async(|| "hello");

        let result = future.join().unwrap();

        assert_eq!(result, "hello");
        assert!(future.is_done());
        assert!(!future.is_failed());
    }

    #[test]
    fn plain_thread_needs_a_shared_slot() {
        let holder = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let slot = holder.clone();

        let handle = thread::spawn(move || *slot.lock() = Some("hello"));
        handle.join().expect("The writer thread has panicked");

        assert_eq!(*holder.lock(), Some("hello"));
    }

    #[test]
    fn get_returns_the_value() {
        let future = supply_async(|| "hello");
        assert_eq!(future.get().unwrap(), "hello");
    }

    #[test]
    fn join_surfaces_failure_with_original_cause() {
        init_test_logging();
        let future = try_supply_async(|| Err::<String, _>(IllegalState("boom")));

        let thrown = future.join().unwrap_err();

        assert!(matches!(thrown, Error::Computation(_)));
        let source = thrown.source().expect("failure keeps its cause");
        assert_eq!(source.downcast_ref::<IllegalState>().unwrap().0, "boom");
    }

    #[test]
    fn map_transforms_synchronously() {
        let future = supply_async(|| 10).map(|value| value * 2);
        assert_eq!(future.join().unwrap(), 20);
    }

    #[test]
    fn map_continues_on_the_completing_worker() {
        init_test_logging();
        let worker = ThreadPool::single("worker-").unwrap();
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let upstream = supply_async_on(&worker, move || {
            gate_rx.recv().unwrap();
            thread_name()
        });
        let future = upstream.map(|name| format!("{name}->{}", thread_name()));
        gate_tx.send(()).unwrap();

        let thread_chain = future.join().unwrap();

        assert_eq!(thread_chain, "worker-0->worker-0");
        worker.shutdown();
    }

    #[test]
    fn map_async_runs_on_the_given_executor() {
        let worker = ThreadPool::single("worker-").unwrap();
        let continuation = ThreadPool::single("continuation-").unwrap();

        let future = supply_async_on(&worker, thread_name)
            .map_async(&continuation, |name| format!("{name}->{}", thread_name()));

        let thread_chain = future.join().unwrap();
        assert!(thread_chain.starts_with("worker-"));
        assert!(thread_chain.contains("continuation-"));

        worker.shutdown();
        continuation.shutdown();
    }

    #[test]
    fn join_is_idempotent() {
        let runs = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = runs.clone();
        let future =
            supply_async(move || counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 41);
        assert_eq!(future.join().unwrap(), 41);
        assert_eq!(future.join().unwrap(), 41);
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
