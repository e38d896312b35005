//! Retry loop with randomized backoff.

use crate::error::{ChorusError, Result};
use std::future::Future;
use std::time::Duration;

/// Delay policy for [`retry_with_jitter`].
///
/// Each wait is `base` plus a uniformly random extra in `0..=jitter`, so
/// contending replicas spread out instead of retrying in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub jitter: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Backoff {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self {
            base,
            jitter,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            rand::random::<u64>() % (jitter_ms + 1)
        } else {
            0
        };
        self.base + Duration::from_millis(extra)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_millis(50))
    }
}

/// Runs `attempt` until it yields a value.
///
/// `Ok(Some(v))` finishes, `Ok(None)` sleeps and tries again, `Err` aborts
/// immediately. Running out of attempts is a [`ChorusError::Lock`].
pub async fn retry_with_jitter<T, F, Fut>(backoff: Backoff, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let mut attempts: u32 = 0;
    loop {
        if let Some(value) = attempt().await? {
            return Ok(value);
        }
        attempts += 1;
        if let Some(max) = backoff.max_attempts {
            if attempts >= max {
                return Err(ChorusError::lock(format!(
                    "gave up after {} attempts",
                    attempts
                )));
            }
        }
        tokio::time::sleep(backoff.delay()).await;
    }
}
