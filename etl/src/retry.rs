//! Exponential backoff around calls to the source, the state store and the destination.

use std::future::Future;
use std::time::Duration;

use config::shared::RetryConfig;
use tracing::{error, warn};

use crate::error::EtlResult;

/// Retries transient failures with an exponentially growing, capped delay.
///
/// The first attempt runs immediately. After each transient failure the call is retried once
/// the current delay elapsed, and the delay is multiplied by the backoff factor up to the
/// maximum. Once a retry made after waiting the maximum delay fails too, its error is
/// returned. Errors that are not transient are returned without retrying.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
}

impl Backoff {
    pub fn new(initial_delay: Duration, backoff_factor: f64, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            backoff_factor,
            max_delay,
        }
    }

    /// Returns the delay following `delay`, never above the maximum.
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails permanently or the delay is exhausted.
    ///
    /// `name` identifies the operation in logs.
    pub async fn retry<T, F, Fut>(&self, name: &str, mut operation: F) -> EtlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EtlResult<T>>,
    {
        let mut delay = self.initial_delay.min(self.max_delay);
        let mut waited_max_delay = false;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(err);
            }

            if waited_max_delay {
                error!(
                    operation = name,
                    attempts = attempt,
                    error = %err,
                    "giving up after reaching the maximum retry delay"
                );

                return Err(err);
            }

            warn!(
                operation = name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );

            tokio::time::sleep(delay).await;

            let next = self.next_delay(delay);
            waited_max_delay = delay >= self.max_delay || next <= delay;
            delay = next;
        }
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(config: &RetryConfig) -> Self {
        Backoff::new(
            config.initial_delay(),
            config.backoff_factor,
            config.max_delay(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ErrorKind;
    use crate::etl_error;

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_millis(1), 2.0, Duration::from_millis(4))
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result = backoff()
            .retry("flaky", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(etl_error!(
                            ErrorKind::SourceConnectionFailed,
                            "Connection refused"
                        ))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result: EtlResult<()> = backoff()
            .retry("malformed", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(etl_error!(ErrorKind::InvalidData, "Malformed row"))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidData);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_waiting_the_maximum_delay() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result: EtlResult<()> = backoff()
            .retry("down", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(etl_error!(
                        ErrorKind::DestinationConnectionFailed,
                        "Connection refused"
                    ))
                }
            })
            .await;

        // Waits of 1ms, 2ms and 4ms separate the four attempts.
        assert_eq!(
            result.unwrap_err().kind(),
            ErrorKind::DestinationConnectionFailed
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_next_delay_is_capped() {
        let backoff = backoff();

        assert_eq!(
            backoff.next_delay(Duration::from_millis(1)),
            Duration::from_millis(2)
        );
        assert_eq!(
            backoff.next_delay(Duration::from_millis(3)),
            Duration::from_millis(4)
        );
    }

    #[tokio::test]
    async fn test_constant_delay_retries_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backoff = Backoff::new(Duration::from_millis(1), 1.0, Duration::from_millis(10));

        let result: EtlResult<()> = backoff
            .retry("constant", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(etl_error!(ErrorKind::Unknown, "Unexpected failure"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
