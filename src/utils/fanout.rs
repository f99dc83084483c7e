use futures::future::join_all;
use std::fmt::{Debug, Display};
use std::future::Future;
use tracing::warn;

/// Outcome of a fan-out: every job ran to completion, results split by success.
#[derive(Debug)]
pub struct FanOut<K, T, E> {
    pub succeeded: Vec<(K, T)>,
    pub failed: Vec<(K, E)>,
}

impl<K, T, E> FanOut<K, T, E> {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Runs all jobs concurrently, waits for every one of them, and partitions the
/// results. Each failure is logged under `label`; none of them aborts the batch.
pub async fn gather_partitioned<K, T, E, F, I>(label: &str, jobs: I) -> FanOut<K, T, E>
where
    I: IntoIterator<Item = (K, F)>,
    F: Future<Output = Result<T, E>>,
    K: Debug,
    E: Display,
{
    let results = join_all(jobs.into_iter().map(|(key, job)| async move { (key, job.await) })).await;

    let mut succeeded = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    for (key, result) in results {
        match result {
            Ok(value) => succeeded.push((key, value)),
            Err(e) => {
                warn!("{}: {:?} failed: {}", label, key, e);
                failed.push((key, e));
            }
        }
    }

    FanOut { succeeded, failed }
}
