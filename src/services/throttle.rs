use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Fixed-interval admission gate.
///
/// A request is admitted when at least `interval` has passed since the last
/// admitted request. Rejections leave the gate untouched, so the gate always
/// reopens once the interval elapses, however many requests were turned away.
pub struct AdmissionThrottle {
    interval: Duration,
    last_admitted: Mutex<Option<Instant>>,
}

impl AdmissionThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_admitted: Mutex::new(None),
        }
    }

    /// A gate that admits everything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn try_admit(&self) -> Result<(), ThrottleError> {
        if self.interval.is_zero() {
            return Ok(());
        }

        let now = Instant::now();
        let mut last = self
            .last_admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.interval {
                return Err(ThrottleError::RateLimited {
                    retry_after: self.interval - elapsed,
                });
            }
        }

        *last = Some(now);
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ThrottleError {
    #[error("Too many requests, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },
}
