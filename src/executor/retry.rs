//! Bounded exponential backoff for collaborator calls

use std::time::Duration;

use tracing::warn;

use super::error::ExecError;
use crate::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per call, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before retrying after the `attempt`-th failure (1-based)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.checked_mul(exp).unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails for good, or attempts run out
    ///
    /// Only transient failures are retried.
    pub fn run<T, F>(&self, operation: &str, mut call: F) -> Result<T, ExecError>
    where
        F: FnMut() -> Result<T, ExecError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 1_000,
        });
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_for_attempt(4), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for_attempt(40), Duration::from_millis(1_000));
    }

    #[test]
    fn test_transient_retried_until_success() {
        let calls = Cell::new(0);
        let result = instant(3).run("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(ExecError::Transient("timeout".into()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_attempts_exhausted() {
        let calls = Cell::new(0);
        let result: Result<(), _> = instant(2).run("test", || {
            calls.set(calls.get() + 1);
            Err(ExecError::Transient("reset".into()))
        });
        assert_eq!(result, Err(ExecError::Transient("reset".into())));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_syntax_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = instant(5).run("test", || {
            calls.set(calls.get() + 1);
            Err(ExecError::Syntax("near SELECT".into()))
        });
        assert!(matches!(result, Err(ExecError::Syntax(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_zero_attempts_still_calls_once() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        });
        assert_eq!(policy.run("test", || Ok::<_, ExecError>(1)), Ok(1));
    }
}
