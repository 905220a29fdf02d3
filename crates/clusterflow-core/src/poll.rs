//! Bounded polling for eventually-consistent external state.
//!
//! Every stage that waits on the outside world (IP assignment, SSH
//! reachability, API-server readiness) goes through [`poll_until`], so
//! retry and timeout policy live in exactly one place. The poller has no
//! domain knowledge: the caller supplies the action and the readiness
//! predicate, and decides whether a timeout is fatal or degradable.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Wall-clock budget and probe interval for one wait condition.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Outcome of a bounded wait.
#[derive(Debug)]
pub enum PollOutcome<T> {
    /// The predicate accepted a value before the budget expired.
    Ready(T),
    /// The budget expired; carries the last successfully observed value,
    /// if any, so non-critical waits can degrade to a best-effort result.
    TimedOut(Option<T>),
}

impl<T> PollOutcome<T> {
    pub fn timed_out(&self) -> bool {
        matches!(self, PollOutcome::TimedOut(_))
    }

    /// The ready value, or `None` on timeout.
    pub fn ready(self) -> Option<T> {
        match self {
            PollOutcome::Ready(v) => Some(v),
            PollOutcome::TimedOut(_) => None,
        }
    }

    /// The ready value or the last observation, whichever exists.
    pub fn into_latest(self) -> Option<T> {
        match self {
            PollOutcome::Ready(v) => Some(v),
            PollOutcome::TimedOut(v) => v,
        }
    }
}

/// Repeatedly run `action` until `ready` accepts its output or the budget
/// expires. Action errors count as "not ready yet" and are retried; they
/// only surface through the timeout path.
pub async fn poll_until<F, Fut, T, E, P>(
    config: PollConfig,
    operation: &str,
    mut action: F,
    mut ready: P,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let mut latest = None;

    loop {
        match action().await {
            Ok(value) => {
                if ready(&value) {
                    return PollOutcome::Ready(value);
                }
                latest = Some(value);
            }
            Err(e) => {
                debug!(operation, error = %e, "probe failed, will retry");
            }
        }

        if started.elapsed() + config.interval > config.timeout {
            warn!(
                operation,
                timeout_secs = config.timeout.as_secs(),
                "wait condition did not converge within budget"
            );
            return PollOutcome::TimedOut(latest);
        }
        tokio::time::sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(timeout_ms: u64) -> PollConfig {
        PollConfig::new(Duration::from_millis(1), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn ready_immediately() {
        let outcome = poll_until(
            fast(100),
            "op",
            || async { Ok::<_, &str>(7) },
            |v| *v == 7,
        )
        .await;
        assert_eq!(outcome.ready(), Some(7));
    }

    #[tokio::test]
    async fn becomes_ready_after_retries() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let outcome = poll_until(
            fast(500),
            "op",
            || {
                let c = c.clone();
                async move { Ok::<_, &str>(c.fetch_add(1, Ordering::SeqCst)) }
            },
            |v| *v >= 3,
        )
        .await;
        assert_eq!(outcome.ready(), Some(3));
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn errors_are_retried_until_timeout() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let outcome = poll_until(
            fast(20),
            "op",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>("unreachable")
                }
            },
            |_| true,
        )
        .await;
        assert!(outcome.timed_out());
        assert!(count.load(Ordering::SeqCst) > 1);
        assert!(outcome.into_latest().is_none());
    }

    #[tokio::test]
    async fn timeout_keeps_last_observation() {
        let outcome = poll_until(
            fast(20),
            "op",
            || async { Ok::<_, &str>("partial") },
            |_| false,
        )
        .await;
        assert!(outcome.timed_out());
        assert_eq!(outcome.into_latest(), Some("partial"));
    }
}
