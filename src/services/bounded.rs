//! Time-bounded waits whose losing side keeps running detached.

use std::{future::Future, time::Duration};

use tokio::time::timeout;
use tracing::warn;

/// Result of racing a task against a deadline.
#[derive(Debug, PartialEq, Eq)]
pub enum Raced<T> {
    /// The task settled first.
    Completed(T),
    /// The deadline fired first; the task keeps running in the background.
    TimedOut,
    /// The task panicked or was cancelled before settling.
    Aborted,
}

/// Start `task` and a `limit` timer together and return whichever settles first.
///
/// The task is spawned so that losing the race only drops our interest in it;
/// whatever side effects it was performing run to completion.
pub async fn race<F>(limit: Duration, task: F) -> Raced<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = tokio::spawn(task);
    match timeout(limit, handle).await {
        Ok(Ok(value)) => Raced::Completed(value),
        Ok(Err(err)) => {
            warn!(error = %err, "raced task did not settle");
            Raced::Aborted
        }
        Err(_) => Raced::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use tokio::time::{Instant, sleep};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fast_task_wins_immediately() {
        let started = Instant::now();
        let outcome = race(Duration::from_secs(3), async {
            sleep(Duration::from_millis(50)).await;
            7
        })
        .await;

        assert_eq!(outcome, Raced::Completed(7));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_and_loser_still_finishes() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let started = Instant::now();
        let outcome = race(Duration::from_secs(3), async move {
            sleep(Duration::from_secs(10)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        assert_eq!(outcome, Raced::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!finished.load(Ordering::SeqCst));

        sleep(Duration::from_secs(8)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_aborted() {
        let outcome: Raced<()> = race(Duration::from_secs(1), async { panic!("boom") }).await;
        assert_eq!(outcome, Raced::Aborted);
    }
}
