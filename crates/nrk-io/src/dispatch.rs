//! Order-preserving worker dispatch.

use rayon::prelude::*;

use crate::error::{IoError, Result};
use crate::progress::ProgressTracker;

/// Apply `f` to every item and return the results in input order.
///
/// With `workers <= 1` items are processed on the calling thread. Otherwise
/// a dedicated pool of exactly `workers` threads is built for this batch.
/// The first `Err` stops the batch and is returned.
pub fn ordered_map<T, R, F>(
    workers: usize,
    items: &[T],
    tracker: &ProgressTracker<'_>,
    f: F,
) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync + Send,
{
    let run = |item: &T| {
        let result = f(item);
        tracker.advance();
        result
    };

    if workers <= 1 {
        return items.iter().map(run).collect();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("nrk-import-{i}"))
        .build()
        .map_err(|e| IoError::WorkerPool(e.to_string()))?;

    tracing::debug!(workers, items = items.len(), "dispatching to worker pool");
    pool.install(|| items.par_iter().map(run).collect())
}

/// Number of workers to use when none is given: all cores but two.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(2)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{HistoryCallback, SilentProgress};
    use std::time::Duration;

    #[test]
    fn test_results_keep_input_order() {
        let items: Vec<u64> = (0..50).collect();
        let tracker = ProgressTracker::start(&SilentProgress, items.len());

        let out = ordered_map(4, &items, &tracker, |&i| {
            // Later items finish first
            std::thread::sleep(Duration::from_micros(50 * (50 - i)));
            Ok(i * 2)
        })
        .unwrap();

        assert_eq!(out, items.iter().map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_sequential_path() {
        let items = vec!["a", "bb", "ccc"];
        let history = HistoryCallback::new();
        let tracker = ProgressTracker::start(&history, items.len());

        let out = ordered_map(1, &items, &tracker, |s| Ok(s.len())).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(history.history().len(), 3);
    }

    #[test]
    fn test_error_is_returned() {
        let items: Vec<usize> = (0..20).collect();
        let tracker = ProgressTracker::start(&SilentProgress, items.len());

        let result = ordered_map(3, &items, &tracker, |&i| {
            if i == 7 {
                Err(IoError::invalid_argument("seven"))
            } else {
                Ok(i)
            }
        });
        assert!(matches!(result, Err(IoError::InvalidArgument(_))));
    }

    #[test]
    fn test_default_workers_is_positive() {
        assert!(default_workers() >= 1);
    }
}
