// Bounded retry with exponential backoff and a per-attempt timeout, applied
// to providers as a decorator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::source::{SharedSource, Source, SourceError};

/// How often and how patiently a provider is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl RetryPolicy {
    /// Delay slept before `attempt` (1-based): none before the first, then
    /// `base_delay * 2^(attempt - 2)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds or the attempts are used up. A timeout
    /// counts as one failed attempt. `Ok(None)` is an answer and is not
    /// retried.
    pub async fn run<T, F, Fut>(&self, source_name: &str, mut op: F) -> Result<Option<T>, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, SourceError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                debug!(source = source_name, attempt, ?delay, "backing off before retry");
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(answer)) => return Ok(answer),
                Ok(Err(e)) => {
                    warn!(source = source_name, attempt, "attempt failed: {e}");
                    last_error = e.to_string();
                }
                Err(_) => {
                    let e = SourceError::Timeout {
                        source_name: source_name.to_string(),
                        timeout: self.timeout,
                    };
                    warn!(source = source_name, attempt, "attempt failed: {e}");
                    last_error = e.to_string();
                }
            }
        }

        Err(SourceError::Exhausted {
            source_name: source_name.to_string(),
            attempts,
            last_error,
        })
    }
}

// ---------------------------------------------------------------------------
// Decorator
// ---------------------------------------------------------------------------

/// Wraps a source so every `fetch` goes through a [`RetryPolicy`].
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T, S> Source<T> for Retrying<S>
where
    S: Source<T>,
    T: Send + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, identity: &str) -> Result<Option<T>, SourceError> {
        self.policy
            .run(self.inner.name(), || self.inner.fetch(identity))
            .await
    }
}

/// Decorate a shared source with retry, keeping it shareable.
pub fn with_retry<T>(source: SharedSource<T>, policy: RetryPolicy) -> SharedSource<T>
where
    T: Send + 'static,
{
    Arc::new(Retrying::new(source, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times, then answers with `value`.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        value: Option<u32>,
    }

    #[async_trait]
    impl Source<u32> for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch(&self, _identity: &str) -> Result<Option<u32>, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(SourceError::request("flaky", format!("boom {call}")))
            } else {
                Ok(self.value)
            }
        }
    }

    /// Never answers within any reasonable timeout.
    struct Stalled {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Source<u32> for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn fetch(&self, _identity: &str) -> Result<Option<u32>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Some(0))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn backoff_doubles_after_first_retry() {
        let p = policy();
        assert_eq!(p.delay_before(1), Duration::ZERO);
        assert_eq!(p.delay_before(2), Duration::from_millis(100));
        assert_eq!(p.delay_before(3), Duration::from_millis(200));
        assert_eq!(p.delay_before(4), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_from_transient_failures() {
        let source = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
            value: Some(7),
        });
        let retrying = Retrying::new(Arc::clone(&source), policy());

        assert_eq!(retrying.fetch("x").await.unwrap(), Some(7));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let source = Arc::new(Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
            value: Some(7),
        });
        let retrying = Retrying::new(Arc::clone(&source), policy());

        let err = retrying.fetch("x").await.unwrap_err();
        assert!(matches!(err, SourceError::Exhausted { attempts: 3, .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_answer_is_not_retried() {
        let source = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
            value: None,
        });
        let retrying = Retrying::new(Arc::clone(&source), policy());

        assert_eq!(retrying.fetch("x").await.unwrap(), None);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failed_attempt() {
        let source = Arc::new(Stalled {
            calls: AtomicU32::new(0),
        });
        let retrying = Retrying::new(Arc::clone(&source), policy());

        let err = retrying.fetch("x").await.unwrap_err();
        match err {
            SourceError::Exhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn decorated_shared_source_keeps_name() {
        let source: SharedSource<u32> = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
            value: Some(1),
        });
        let decorated = with_retry(source, policy());
        assert_eq!(decorated.name(), "flaky");
        assert_eq!(decorated.fetch("x").await.unwrap(), Some(1));
    }
}
