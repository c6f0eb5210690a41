//! Bounded worker pool for independent backtest jobs.
//!
//! Jobs run on the blocking thread pool with at most `max_workers` in flight.
//! Each worker sends its outcome over a channel to a single collector; failed
//! or panicked jobs are logged and left out of the results.

use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info};

/// A successfully completed job and its output.
#[derive(Debug, Clone)]
pub struct Completed<J, T> {
    pub job: J,
    pub output: T,
}

/// Everything the collector received.
#[derive(Debug)]
pub struct PoolSummary<J, T> {
    pub completed: Vec<Completed<J, T>>,
    pub failed: usize,
}

impl<J, T> PoolSummary<J, T> {
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }
}

/// Run `work` for every job and collect the outcomes.
pub async fn run_pool<J, T, F>(jobs: Vec<J>, max_workers: usize, work: F) -> PoolSummary<J, T>
where
    J: Display + Send + 'static,
    T: Send + 'static,
    F: Fn(&J) -> anyhow::Result<T> + Send + Sync + 'static,
{
    let total = jobs.len();
    let workers = max_workers.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));
    let work = Arc::new(work);
    let (tx, mut rx) = mpsc::channel::<(String, anyhow::Result<Completed<J, T>>)>(workers * 2);

    info!(jobs = total, max_workers = workers, "Starting sweep workers");

    let dispatcher = tokio::spawn(async move {
        for job in jobs {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let work = Arc::clone(&work);
            let tx = tx.clone();

            tokio::spawn(async move {
                let name = job.to_string();
                let outcome = tokio::task::spawn_blocking(move || {
                    let output = work(&job)?;
                    Ok(Completed { job, output })
                })
                .await
                .unwrap_or_else(|e| {
                    if e.is_panic() {
                        Err(anyhow::anyhow!("worker panicked"))
                    } else {
                        Err(anyhow::anyhow!("worker cancelled: {e}"))
                    }
                });

                drop(permit);
                // The collector only stops once every sender is gone.
                let _ = tx.send((name, outcome)).await;
            });
        }
    });

    let mut summary = PoolSummary {
        completed: Vec::with_capacity(total),
        failed: 0,
    };

    while let Some((name, outcome)) = rx.recv().await {
        match outcome {
            Ok(done) => summary.completed.push(done),
            Err(e) => {
                error!(job = %name, error = %e, "Sweep job failed");
                summary.failed += 1;
            }
        }

        let finished = summary.completed.len() + summary.failed;
        if finished % 10 == 0 || finished == total {
            info!(progress = format!("{finished}/{total}"), "Sweep progress");
        }
    }

    if let Err(e) = dispatcher.await {
        error!(error = %e, "Job dispatcher stopped unexpectedly");
    }

    info!(
        completed = summary.completed.len(),
        failed = summary.failed,
        "Sweep workers finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_jobs_complete() {
        let summary = run_pool((1..=20).collect::<Vec<u32>>(), 4, |n| Ok(n * 2)).await;

        assert_eq!(summary.failed, 0);
        assert_eq!(summary.completed_count(), 20);
        let mut outputs: Vec<u32> = summary.completed.iter().map(|c| c.output).collect();
        outputs.sort();
        assert_eq!(outputs, (1..=20).map(|n| n * 2).collect::<Vec<_>>());
        assert!(summary.completed.iter().all(|c| c.output == c.job * 2));
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_excluded() {
        let summary = run_pool((0..10).collect::<Vec<u32>>(), 3, |n| {
            if *n == 3 {
                anyhow::bail!("bad parameters");
            }
            if *n == 7 {
                panic!("boom");
            }
            Ok(*n)
        })
        .await;

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.completed_count(), 8);
        assert!(summary.completed.iter().all(|c| c.job != 3 && c.job != 7));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));

        let summary = run_pool((0..12).collect::<Vec<u32>>(), 2, move |_| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            r.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert_eq!(summary.completed_count(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_empty_job_list() {
        let summary = tokio_test::block_on(run_pool(Vec::<u32>::new(), 4, |n| Ok(*n)));
        assert_eq!(summary.completed_count(), 0);
        assert_eq!(summary.failed, 0);
    }
}
