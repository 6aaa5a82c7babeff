use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded exponential backoff shared by every retry site.
///
/// Attempt `n` (1-based) that fails is followed by a sleep of
/// `initial_delay_ms * multiplier^(n-1)`, optionally capped at `max_delay_ms`.
/// No sleep follows the final attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: Option<u64>,
}

fn default_max_attempts() -> u32 { 20 }
fn default_initial_delay_ms() -> u64 { 250 }
fn default_multiplier() -> f64 { 2.0 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_attempts(default_max_attempts())
    }
}

impl RetryPolicy {
    /// 250ms initial delay, doubling, with the given attempt ceiling.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: None,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = self.initial_delay_ms as f64 * self.multiplier.powi(exp);
        let ms = match self.max_delay_ms {
            Some(cap) => ms.min(cap as f64),
            None => ms,
        };
        if ms.is_finite() && ms > 0.0 {
            Duration::from_secs_f64(ms / 1000.0)
        } else {
            Duration::ZERO
        }
    }

    /// Run `op` until it succeeds or the attempt ceiling is reached.
    /// The last error is returned with the operation name and attempt count attached.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(v);
                }
                Err(e) if attempt >= attempts => {
                    warn!(operation, attempt, "giving up: {:#}", e);
                    return Err(e).with_context(|| {
                        format!("{} failed after {} attempts", operation, attempt)
                    });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, backing off: {:#}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
