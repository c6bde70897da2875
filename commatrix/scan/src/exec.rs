use std::{future::Future, time::Duration};
use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Runs shell commands in a node's privileged execution context.
#[async_trait::async_trait]
pub trait Execute {
    /// Runs `command` until it succeeds or `backoff.timeout` elapses, returning its stdout.
    ///
    /// Implementations retry internally (see [`retry`]); an error returned here means the retry
    /// budget is exhausted and carries the last attempt's failure.
    async fn execute(&self, command: &str, backoff: &Backoff) -> anyhow::Result<Vec<u8>>;
}

/// Acquires and releases per-node execution contexts.
#[async_trait::async_trait]
pub trait Connect {
    type Session: Execute + Send + Sync;

    async fn connect(&self, node: &str) -> anyhow::Result<Self::Session>;

    /// Tears down a session. Failures are reported but never affect a scan's result.
    async fn release(&self, session: Self::Session) -> anyhow::Result<()>;
}

/// A fixed-interval retry budget for a single remote command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Polls `operation` immediately and then every `backoff.interval` until it succeeds.
///
/// Once `backoff.timeout` has elapsed since the first attempt, the last error is returned. The
/// operation is always attempted at least once.
pub async fn retry<F, Fut, T>(
    backoff: &Backoff,
    name: &str,
    mut operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let deadline = Instant::now() + backoff.timeout;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(res) => {
                trace!(operation = %name, attempt, "Succeeded");
                return Ok(res);
            }
            Err(error) => error,
        };

        let now = Instant::now();
        if now >= deadline {
            debug!(operation = %name, attempt, %error, "Retry budget exhausted");
            return Err(error.context(format!(
                "{name} failed after {attempt} attempts in {:?}",
                backoff.timeout
            )));
        }

        let delay = backoff.interval.min(deadline - now);
        debug!(operation = %name, attempt, %error, delay_ms = delay.as_millis(), "Retrying");
        time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn backoff() -> Backoff {
        Backoff {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = &AtomicU32::new(0);
        let start = Instant::now();
        let out = retry(&backoff(), "flaky", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                anyhow::bail!("not yet");
            }
            Ok("done")
        })
        .await
        .expect("must succeed");

        assert_eq!(out, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_deadline() {
        let calls = &AtomicU32::new(0);
        let start = Instant::now();
        let err = retry(&backoff(), "broken", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("attempt {n} failed")
        })
        .await
        .map(|()| ())
        .expect_err("must fail");

        // One immediate attempt, then one per interval up to and including the deadline.
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(
            format!("{err:#}").contains("attempt 10 failed"),
            "last error is kept: {err:#}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_attempts_once() {
        let calls = &AtomicU32::new(0);
        let backoff = Backoff {
            interval: Duration::from_millis(500),
            timeout: Duration::ZERO,
        };
        let res = retry(&backoff, "once", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("nope")
        })
        .await;

        assert!(res.map(|()| ()).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
