//! Bounded retry
//!
//! Operations report each attempt as an [`Attempt`]; [`retry`] decides
//! whether to try again. Delays happen between attempts, never after the last.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Outcome of a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Success(T),
    /// Transient: timeout, rate limit, 5xx, transport failure
    Retriable(String),
    /// Stop immediately
    Fatal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay between every attempt
    Fixed,
    /// Attempt N waits N × base delay
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Linear,
        }
    }

    /// Delay after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    Fatal { attempt: u32, reason: String },
    Exhausted { attempts: u32, last: String },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempt, .. } => *attempt,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            RetryError::Fatal { reason, .. } => reason,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or runs out of attempts.
///
/// `op` receives the 1-based attempt number. A policy with zero attempts is
/// treated as one.
pub async fn retry<T, F, Fut>(label: &str, policy: RetryPolicy, mut op: F) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=max_attempts {
        match op(attempt).await {
            Attempt::Success(value) => return Ok(value),
            Attempt::Fatal(reason) => return Err(RetryError::Fatal { attempt, reason }),
            Attempt::Retriable(reason) => {
                if attempt < max_attempts {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {} (retrying in {:?})",
                        label, attempt, max_attempts, reason, delay
                    );
                    sleep(delay).await;
                } else {
                    warn!("{} attempt {}/{} failed: {}", label, attempt, max_attempts, reason);
                }
                last = reason;
            }
        }
    }

    Err(RetryError::Exhausted {
        attempts: max_attempts,
        last,
    })
}
