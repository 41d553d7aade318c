//! Bounded worker pool shared by fact resolution, rendering and deployment.

use rayon::ThreadPool;

/// Build a pool with `jobs` worker threads (at least one).
///
/// # Errors
///
/// Returns an error if the operating system refuses to spawn the threads.
pub fn worker_pool(jobs: usize) -> Result<ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .thread_name(|i| format!("nectl-worker-{i}"))
        .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_jobs_still_gets_one_thread() {
        let pool = worker_pool(0).unwrap();
        assert_eq!(pool.current_num_threads(), 1);
    }

    #[test]
    fn pool_has_requested_threads() {
        let pool = worker_pool(3).unwrap();
        assert_eq!(pool.current_num_threads(), 3);
    }
}
