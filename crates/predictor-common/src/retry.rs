//! Exponential backoff retry machinery, used for broker reconnection (C2,
//! C6) and the document store's initial connection (C1).

use crate::{Error, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Parameters for exponential-backoff retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
    pub max_jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
            max_jitter: 0.1,
        }
    }
}

/// Named retry strategies.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    NoRetry,
    FixedDelay(Duration),
    ExponentialBackoff { config: RetryConfig },
}

impl RetryStrategy {
    pub fn exponential_backoff() -> Self {
        Self::ExponentialBackoff {
            config: RetryConfig::default(),
        }
    }
}

/// Drives repeated attempts of a fallible operation under a `RetryStrategy`.
pub struct RetryExecutor {
    strategy: RetryStrategy,
    operation_name: String,
}

impl RetryExecutor {
    pub fn new(strategy: RetryStrategy, operation_name: impl Into<String>) -> Self {
        Self {
            strategy,
            operation_name: operation_name.into(),
        }
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match &self.strategy {
            RetryStrategy::NoRetry => {
                debug!(operation = %self.operation_name, "executing without retry");
                operation().await
            }
            RetryStrategy::FixedDelay(delay) => self.run_fixed(*delay, operation).await,
            RetryStrategy::ExponentialBackoff { config } => {
                self.run_backoff(config.clone(), &mut operation).await
            }
        }
    }

    async fn run_fixed<F, Fut, T>(&self, delay: Duration, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;
        for attempt in 1..=3u32 {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(operation = %self.operation_name, attempt, "succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    warn!(operation = %self.operation_name, attempt, %error, "attempt failed");
                    last_error = Some(error);
                    if attempt < 3 {
                        sleep(delay).await;
                    }
                }
            }
        }
        Err(last_error.expect("loop runs at least once"))
    }

    async fn run_backoff<F, Fut, T>(&self, config: RetryConfig, operation: &mut F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;
        let mut current_delay = config.base_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(operation = %self.operation_name, attempt, "succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    warn!(operation = %self.operation_name, attempt, %error, "attempt failed");
                    last_error = Some(error);
                    if attempt >= config.max_attempts {
                        break;
                    }
                    let delay = if config.use_jitter {
                        add_jitter(current_delay, config.max_jitter)
                    } else {
                        current_delay
                    };
                    sleep(delay).await;
                    current_delay = Duration::from_millis(
                        ((current_delay.as_millis() as f64) * config.backoff_multiplier) as u64,
                    )
                    .min(config.max_delay);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Generic(anyhow::anyhow!("no error recorded"))))
    }
}

fn add_jitter(delay: Duration, max_jitter: f64) -> Duration {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..max_jitter.max(0.0001));
    let delay_ms = delay.as_millis() as f64;
    Duration::from_millis((delay_ms + delay_ms * jitter_factor) as u64)
}

/// Convenience wrapper around `RetryExecutor::execute`.
pub async fn retry_operation<F, Fut, T>(
    operation_name: &str,
    strategy: RetryStrategy,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    RetryExecutor::new(strategy, operation_name).execute(operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let result = retry_operation("noop", RetryStrategy::NoRetry, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let result = retry_operation(
            "flaky",
            RetryStrategy::ExponentialBackoff {
                config: RetryConfig {
                    max_attempts: 5,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(5),
                    backoff_multiplier: 1.0,
                    use_jitter: false,
                    max_jitter: 0.0,
                },
            },
            move || {
                let a = a.clone();
                async move {
                    if a.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::BrokerUnavailable("not yet".into()))
                    } else {
                        Ok("ok")
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_max_attempts() {
        let result: Result<()> = retry_operation(
            "always-fails",
            RetryStrategy::ExponentialBackoff {
                config: RetryConfig {
                    max_attempts: 2,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(2),
                    backoff_multiplier: 1.0,
                    use_jitter: false,
                    max_jitter: 0.0,
                },
            },
            || async { Err(Error::BrokerUnavailable("down".into())) },
        )
        .await;
        assert!(result.is_err());
    }
}
