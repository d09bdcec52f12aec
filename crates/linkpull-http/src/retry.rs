use std::thread;
use std::time::Duration;

use linkpull_core::FetchError;
use tracing::warn;

/// Outcome of a single attempt that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Connection-level failure worth another attempt.
    Transient(String),
    /// Classified failure that retrying will not fix.
    Fatal(FetchError),
}

/// Bounded retry with a doubling, jitter-free wait capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy that never waits, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Wait after the given failed attempt (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails fatally, or the attempts run out.
    /// `op` receives the 0-based attempt number.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Result<T, AttemptError>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Transient(message)) => {
                    if attempt + 1 >= self.max_attempts {
                        return Err(FetchError::Transient {
                            message,
                            attempts: attempt + 1,
                        });
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        endpoint = label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Request failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
