use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_config::RetryConfig;
use warden_core::{Result, WardenError};

/// Whether an error from an outbound call is worth another attempt.
pub fn is_retryable(err: &WardenError) -> bool {
    match err {
        WardenError::Upstream(_)
        | WardenError::UpstreamRateLimited { .. }
        | WardenError::UpstreamTimeout { .. }
        | WardenError::MalformedUpstream(_) => true,
        WardenError::UpstreamRejected { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Bounded attempts with a fixed pause in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }

    /// A policy that makes exactly one attempt.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// attempts run out. Each attempt is raced against `timeout`; the whole
    /// loop, backoff included, is abandoned as soon as `cancel` fires.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        timeout: Duration,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WardenError::Cancelled),
                r = tokio::time::timeout(timeout, op(attempt)) => match r {
                    Ok(inner) => inner,
                    Err(_) => Err(WardenError::UpstreamTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                },
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if is_retryable(&e) && attempt < self.max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        max = self.max_attempts,
                        delay_ms = self.backoff.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(WardenError::Cancelled),
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&WardenError::Upstream("HTTP 503: busy".into())));
        assert!(is_retryable(&WardenError::UpstreamRateLimited { retry_after_secs: 1 }));
        assert!(is_retryable(&WardenError::UpstreamTimeout { timeout_ms: 10 }));
        assert!(is_retryable(&WardenError::MalformedUpstream("bad".into())));
        assert!(!is_retryable(&WardenError::UpstreamRejected {
            status: 400,
            body: String::new()
        }));
        assert!(!is_retryable(&WardenError::Cancelled));
        assert!(!is_retryable(&WardenError::Config("x".into())));
    }

    #[test]
    fn test_attempts_never_zero() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), 2);
        assert_eq!(RetryPolicy::default().backoff(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(2, Duration::from_millis(1500));
        let c = calls.clone();
        let started = tokio::time::Instant::now();
        let out = policy
            .run("refine", Duration::from_secs(5), &CancellationToken::new(), move |attempt| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    if attempt == 1 {
                        Err(WardenError::Upstream("connection reset".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = RetryPolicy::new(2, Duration::from_millis(10))
            .run("refine", Duration::from_secs(5), &CancellationToken::new(), move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(WardenError::UpstreamRateLimited { retry_after_secs: 1 })
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::UpstreamRateLimited { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = RetryPolicy::new(5, Duration::from_millis(10))
            .run("refine", Duration::from_secs(5), &CancellationToken::new(), move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(WardenError::UpstreamRejected {
                        status: 422,
                        body: "bad plan".into(),
                    })
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::UpstreamRejected { status: 422, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let err = RetryPolicy::once()
            .run("refine", Duration::from_millis(250), &CancellationToken::new(), |_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::UpstreamTimeout { timeout_ms: 250 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let err = RetryPolicy::new(3, Duration::from_secs(1))
            .run("refine", Duration::from_secs(60), &cancel, |_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Cancelled));
    }
}
