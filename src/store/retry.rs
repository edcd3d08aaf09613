use std::thread;
use std::time::Duration;

use tracing::warn;

use super::StoreError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given zero-based failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Runs `op`, retrying transient failures with exponential backoff.
    /// Blocks the calling thread between attempts.
    pub fn run<T>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    warn!(operation, attempt = attempt + 1, error = %err, "store attempt failed");
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(StoreError::Exhausted {
                            attempts,
                            last: Box::new(err),
                        });
                    }
                    thread::sleep(self.delay_after(attempt - 1));
                }
                Err(err) => return Err(err),
            }
        }
    }
}
