//! Retry Middleware
//!
//! Wraps fallible async operations with bounded, backed-off retries. Only
//! errors reporting [`CacheError::is_retryable`] are retried.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::Result;

// == Retry Policy ==
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            exponential: config.exponential_backoff,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = if self.exponential {
            let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
            self.base_delay.mul_f64(factor.min(u32::MAX as f64))
        } else {
            self.base_delay
        };
        delay.min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    debug!("attempt {} failed ({}), retrying in {:?}", attempt, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 {
                        warn!("giving up after {} attempts: {}", attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Runs `op` under `policy`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    policy.run(op).await
}

/// Boxed future returned by wrapped operations.
pub type Retrying<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Wraps a one-argument operation so every call is retried under `policy`.
pub fn wrap<A, T, F>(policy: RetryPolicy, op: F) -> impl Fn(A) -> Retrying<T>
where
    A: Clone + Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(A) -> Result<T> + Clone + Send + Sync + 'static,
{
    move |arg: A| {
        let op = op.clone();
        let retrying: Retrying<T> =
            Box::pin(async move { policy.run(|| std::future::ready(op(arg.clone()))).await });
        retrying
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
            exponential: true,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::from(&RetryConfig::default());
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(200));
        assert_eq!(policy.delay_for(20), Duration::from_millis(2_000));

        let flat = RetryPolicy {
            exponential: false,
            ..policy
        };
        assert_eq!(flat.delay_for(5), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CacheError::OperationTimeout(1))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CacheError::InvalidKey("k".into())) }
        })
        .await;
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CacheError::CapacityExceeded("full".into())) }
            })
            .await;
        assert!(matches!(result, Err(CacheError::CapacityExceeded(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wrapped_operation_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let wrapped = wrap(fast(), move |x: u32| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CacheError::OperationTimeout(1))
            } else {
                Ok(x * 2)
            }
        });
        assert_eq!(wrapped(21).await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
