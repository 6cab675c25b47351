// Retry and backoff handling for measurements

use crate::error::MeasurementError;
use crate::measure::Target;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Default attempts per target per cycle
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Delay policy between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    /// Retry immediately
    Immediate,
    /// `step * attempt`
    Linear { step: Duration },
    /// Exponential backoff
    ExponentialBackoff { base_delay: Duration, max_delay: Duration, multiplier: f64 },
}

/// Measurement backoff: 2s doubling per failed attempt
impl Default for RecoveryStrategy {
    fn default() -> Self {
        Self::ExponentialBackoff {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

impl RecoveryStrategy {
    /// Get delay for a specific attempt (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            RecoveryStrategy::Immediate => Duration::ZERO,
            RecoveryStrategy::Linear { step } => step.saturating_mul(attempt),
            RecoveryStrategy::ExponentialBackoff { base_delay, max_delay, multiplier } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let delay_ms = base_delay.as_millis() as f64 * multiplier.powi(exponent);
                let delay = Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64);
                delay.min(*max_delay)
            }
        }
    }
}

/// Operator-facing classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    License,
    Generic,
}

impl FailureClass {
    pub fn of(error: &MeasurementError) -> Self {
        match error {
            MeasurementError::Transient(_) => FailureClass::RateLimited,
            MeasurementError::LicenseRequired(_) => FailureClass::License,
            other => {
                let text = other.to_string().to_lowercase();
                if text.contains("403") || text.contains("forbidden") {
                    FailureClass::RateLimited
                } else if text.contains("license") {
                    FailureClass::License
                } else {
                    FailureClass::Generic
                }
            }
        }
    }
}

/// What happened to one target after the retry loop
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Abandoned { attempts: u32, last_error: MeasurementError },
}

/// Bounded retry wrapper around a single measurement target
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    max_attempts: u32,
    strategy: RecoveryStrategy,
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            strategy: RecoveryStrategy::default(),
        }
    }
}

impl RetryCoordinator {
    /// Create a coordinator with custom settings
    pub fn new(max_attempts: u32, strategy: RecoveryStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            strategy,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Drive `operation` until it succeeds or the attempt cap is reached.
    ///
    /// Every failure, including the last, is followed by its backoff sleep.
    /// `EngineUnavailable` is returned immediately as `Err`; any other
    /// exhausted failure comes back as `RetryOutcome::Abandoned`.
    pub async fn run<F, Fut, T>(&self, target: &Target, mut operation: F) -> Result<RetryOutcome<T>, MeasurementError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, MeasurementError>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(target_server = %target, attempt, "measurement succeeded after retry");
                    }
                    return Ok(RetryOutcome::Succeeded { value, attempts: attempt });
                }
                Err(error) if error.is_fatal() => {
                    tracing::error!(target_server = %target, attempt, error = %error, "engine unavailable, not retrying");
                    return Err(error);
                }
                Err(error) => {
                    let backoff = self.strategy.delay(attempt);
                    log_failure(target, attempt, self.max_attempts, backoff, &error);
                    last_error = Some(error);
                    sleep(backoff).await;
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| MeasurementError::EngineFailure {
            code: None,
            message: "no attempt recorded".to_string(),
        });
        tracing::error!(
            target_server = %target,
            attempts = self.max_attempts,
            error = %last_error,
            "giving up on target for this cycle"
        );
        Ok(RetryOutcome::Abandoned {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

fn log_failure(target: &Target, attempt: u32, max: u32, backoff: Duration, error: &MeasurementError) {
    let backoff_secs = backoff.as_secs_f64();
    match FailureClass::of(error) {
        FailureClass::RateLimited => tracing::warn!(
            target_server = %target, attempt, max, backoff_secs,
            "403/forbidden from speed test backend, backing off"
        ),
        FailureClass::License => tracing::warn!(
            target_server = %target, attempt, max, backoff_secs,
            "license acceptance needed or not persisted, backing off"
        ),
        FailureClass::Generic => tracing::warn!(
            target_server = %target, attempt, max, backoff_secs, error = %error,
            "speed test attempt failed, backing off"
        ),
    }
}
