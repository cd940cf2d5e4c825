//! Retry-with-backoff and circuit breaking for the LLM and vector-store
//! boundaries. Callers keep their own semantic fallbacks; these primitives
//! only decide whether and when a call runs.

use crate::config::ResilienceConfig;
use crate::ports::LanguageModel;
use anyhow::anyhow;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    status: BreakerStatus,
    failures: u32,
    last_failure: Option<Instant>,
}

/// Classic three-state circuit breaker. Open after `failure_threshold`
/// consecutive failures; after `recovery_timeout` one probe call is allowed
/// (half-open) and its outcome closes or re-opens the circuit.
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                status: BreakerStatus::Closed,
                failures: 0,
                last_failure: None,
            }),
            failure_threshold,
            recovery_timeout,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(
            config.llm_failure_threshold,
            Duration::from_secs_f64(config.llm_recovery_timeout_seconds),
        )
    }

    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker poisoned");
        match inner.status {
            BreakerStatus::Closed | BreakerStatus::HalfOpen => true,
            BreakerStatus::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.recovery_timeout {
                    inner.status = BreakerStatus::HalfOpen;
                    tracing::info!("circuit breaker half-open, allowing probe request");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker poisoned");
        inner.failures = 0;
        inner.status = BreakerStatus::Closed;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker poisoned");
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());
        if inner.failures >= self.failure_threshold {
            if inner.status != BreakerStatus::Open {
                tracing::warn!(failures = inner.failures, "circuit breaker opened");
            }
            inner.status = BreakerStatus::Open;
        }
    }

    pub fn status(&self) -> BreakerStatus {
        self.inner.lock().expect("breaker poisoned").status
    }
}

/// Retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            initial_delay: Duration::from_secs_f64(config.retry_delay_seconds),
            backoff: config.retry_backoff,
        }
    }
}

/// Run `operation` up to `policy.attempts` times with exponential backoff
/// between failures.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut delay = policy.initial_delay;
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt == attempts => {
                tracing::error!(operation_name, attempt, error = %err, "operation failed, retries exhausted");
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(
                    operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.backoff);
            }
        }
    }
    unreachable!("retry loop always returns")
}

/// A language model wrapped in retry + circuit breaking. When the circuit is
/// open the call fails fast and the caller applies its semantic fallback.
pub struct ResilientLlm {
    inner: std::sync::Arc<dyn LanguageModel>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl ResilientLlm {
    pub fn new(inner: std::sync::Arc<dyn LanguageModel>, config: &ResilienceConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::from_config(config),
            retry: RetryPolicy::from_config(config),
        }
    }
}

#[async_trait]
impl LanguageModel for ResilientLlm {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        if !self.breaker.allow_request() {
            return Err(anyhow!("llm circuit breaker open, skipping call"));
        }
        let result = retry_with_backoff(&self.retry, "llm.generate", || {
            let inner = std::sync::Arc::clone(&self.inner);
            let prompt = prompt.to_string();
            async move { inner.generate(&prompt).await }
        })
        .await;

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        result
    }
}
