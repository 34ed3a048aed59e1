//! Bounded rayon pools for the parallel stages.

use rayon::{ThreadPool, ThreadPoolBuilder};

/// Run `work` on a dedicated pool of `threads` workers.
///
/// If the pool cannot be built the work runs on rayon's global pool instead;
/// only the degree of parallelism changes, never the result.
pub(crate) fn run_bounded<R, F>(threads: usize, name: &'static str, work: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match build_pool(threads, name) {
        Ok(pool) => pool.install(work),
        Err(err) => {
            tracing::warn!(pool = name, error = %err, "failed to build worker pool; using global pool");
            work()
        }
    }
}

fn build_pool(threads: usize, name: &'static str) -> Result<ThreadPool, rayon::ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |index| format!("{}-{}", name, index))
        .build()
}
