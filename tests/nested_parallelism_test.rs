mod common;

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::common::{init_test_logging, thread_name};
    use parking_lot::Mutex;
    use promise_chain::{all_of, supply_async_on, ThreadPool};

    #[test]
    fn async_task_fans_out_to_another_pool() {
        init_test_logging();
        let parent = ThreadPool::single("parent-").unwrap();
        let workers = ThreadPool::fixed(3, "worker-").unwrap();
        let parent_thread = Arc::new(Mutex::new(String::new()));

        let slot = parent_thread.clone();
        let pool = workers.clone();
        let results = supply_async_on(&parent, move || {
            *slot.lock() = thread_name();
            let futures: Vec<_> = [1, 2, 3]
                .into_iter()
                .map(|input| supply_async_on(&pool, move || input * 2))
                .collect();
            futures
                .iter()
                .map(|f| f.join())
                .collect::<Result<Vec<_>, _>>()
        })
        .join()
        .unwrap()
        .unwrap();

        assert!(parent_thread.lock().starts_with("parent-"));
        assert_eq!(results.into_iter().collect::<HashSet<_>>(), HashSet::from([2, 4, 6]));
        parent.shutdown();
        workers.shutdown();
    }

    #[test]
    fn all_of_over_a_fixed_pool() {
        let workers = ThreadPool::fixed(4, "fan-").unwrap();
        let futures: Vec<_> = (0..32)
            .map(|i| supply_async_on(&workers, move || i * i))
            .collect();

        all_of(&futures).join().unwrap();

        let sum: i32 = futures.iter().map(|f| f.join().unwrap()).sum();
        assert_eq!(sum, (0..32).map(|i| i * i).sum());
    }
}
