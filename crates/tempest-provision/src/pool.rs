//! Bounded-concurrency pool for launch and setup work.
//!
//! Work is submitted explicitly with [`LaunchPool::spawn`] and collected
//! with [`LaunchPool::join_all`], which returns exactly one outcome per
//! submission, in submission order. A unit that panics is reported as
//! [`TaskAborted`] instead of tearing down the rest of the pool.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// Default number of units running at once.
pub const DEFAULT_PARALLELISM: usize = 8;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("task {0} panicked or was cancelled")]
pub struct TaskAborted(pub String);

/// Result of one submitted unit.
#[derive(Debug)]
pub struct GroupOutcome<T> {
    pub key: String,
    pub result: Result<T, TaskAborted>,
}

pub struct LaunchPool<T> {
    semaphore: Arc<Semaphore>,
    set: JoinSet<(usize, T)>,
    keys: Vec<String>,
}

impl<T: Send + 'static> Default for LaunchPool<T> {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLELISM)
    }
}

impl<T: Send + 'static> LaunchPool<T> {
    pub fn new(parallelism: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(parallelism.max(1))),
            set: JoinSet::new(),
            keys: Vec::new(),
        }
    }

    /// Submit a unit; it starts once a permit is free.
    pub fn spawn<F>(&mut self, key: impl Into<String>, work: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let index = self.keys.len();
        self.keys.push(key.into());
        let semaphore = Arc::clone(&self.semaphore);
        self.set.spawn(async move {
            // The semaphore is never closed, so acquire only fails if it is.
            let _permit = semaphore.acquire_owned().await.ok();
            (index, work.await)
        });
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Wait for every unit and return their outcomes in submission order.
    pub async fn join_all(mut self) -> Vec<GroupOutcome<T>> {
        let mut results: Vec<Option<T>> = self.keys.iter().map(|_| None).collect();

        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok((index, output)) => results[index] = Some(output),
                Err(e) => error!(error = %e, "pool task aborted"),
            }
        }

        self.keys
            .into_iter()
            .zip(results)
            .map(|(key, output)| {
                let result = output.ok_or_else(|| TaskAborted(key.clone()));
                GroupOutcome { key, result }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn respects_parallelism() {
        let running = Arc::new(AtomicUsize::new(0));
        let limit = 3;
        let mut pool = LaunchPool::new(limit);

        for i in 0..limit * 5 {
            let running = running.clone();
            pool.spawn(format!("g{i}"), async move {
                let watermark = running.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis((i % 4) as u64)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                watermark
            });
        }

        let outcomes = pool.join_all().await;
        assert_eq!(outcomes.len(), limit * 5);
        for outcome in outcomes {
            let watermark = outcome.result.unwrap();
            assert!(watermark <= limit, "{} saw {watermark} concurrent units", outcome.key);
        }
    }

    #[tokio::test]
    async fn outcomes_follow_submission_order() {
        let mut pool = LaunchPool::new(4);
        for (i, delay) in [30u64, 0, 15].into_iter().enumerate() {
            pool.spawn(format!("g{i}"), async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                i
            });
        }
        let outcomes = pool.join_all().await;
        let keys: Vec<_> = outcomes.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["g0", "g1", "g2"]);
        assert_eq!(outcomes[2].result, Ok(2));
    }

    #[tokio::test]
    async fn panicking_unit_is_reported_not_propagated() {
        let mut pool = LaunchPool::new(2);
        pool.spawn("ok", async { 1 });
        pool.spawn("boom", async {
            if true {
                panic!("launch exploded");
            }
            2
        });

        let outcomes = pool.join_all().await;
        assert_eq!(outcomes[0].result, Ok(1));
        assert_eq!(outcomes[1].result, Err(TaskAborted("boom".into())));
    }
}
