#[cfg(test)]
mod tests {
    use crate::error::MeasurementError;
    use crate::measure::Target;
    use crate::resilience::{FailureClass, RecoveryStrategy, RetryCoordinator, RetryOutcome};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn immediate(max_attempts: u32) -> RetryCoordinator {
        RetryCoordinator::new(max_attempts, RecoveryStrategy::Immediate)
    }

    #[test]
    fn test_default_backoff_doubles_from_two_seconds() {
        let strategy = RecoveryStrategy::default();
        assert_eq!(strategy.delay(1), Duration::from_secs(2));
        assert_eq!(strategy.delay(2), Duration::from_secs(4));
        assert_eq!(strategy.delay(3), Duration::from_secs(8));
        assert_eq!(strategy.delay(4), Duration::from_secs(16));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let strategy = RecoveryStrategy::ExponentialBackoff {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(strategy.delay(3), Duration::from_millis(400));
        assert_eq!(strategy.delay(4), Duration::from_millis(500));
    }

    #[test]
    fn test_linear_backoff() {
        let strategy = RecoveryStrategy::Linear {
            step: Duration::from_millis(500),
        };
        assert_eq!(strategy.delay(1), Duration::from_millis(500));
        assert_eq!(strategy.delay(8), Duration::from_secs(4));
        assert_eq!(RecoveryStrategy::Immediate.delay(5), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_persistent_failure_stops_after_four_attempts() {
        let coordinator = immediate(4);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = coordinator
            .run(&Target::Best, move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(MeasurementError::Transient("HTTP 403".to_string()))
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match outcome {
            RetryOutcome::Abandoned { attempts, last_error } => {
                assert_eq!(attempts, 4);
                assert!(matches!(last_error, MeasurementError::Transient(_)));
            }
            RetryOutcome::Succeeded { .. } => panic!("expected the target to be abandoned"),
        }
    }

    #[tokio::test]
    async fn test_success_on_third_attempt() {
        let coordinator = immediate(4);
        let outcome = coordinator
            .run(&Target::Server("20013".to_string()), |attempt| async move {
                if attempt < 3 {
                    Err(MeasurementError::EngineFailure {
                        code: Some(2),
                        message: "socket closed".to_string(),
                    })
                } else {
                    Ok("measured")
                }
            })
            .await
            .unwrap();

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                assert_eq!(value, "measured");
                assert_eq!(attempts, 3);
            }
            RetryOutcome::Abandoned { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_engine_unavailable_is_not_retried() {
        let coordinator = immediate(4);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = coordinator
            .run(&Target::Best, move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(MeasurementError::EngineUnavailable("missing".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(MeasurementError::EngineUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_sleeps_between_attempts() {
        let coordinator = RetryCoordinator::new(
            2,
            RecoveryStrategy::Linear {
                step: Duration::from_millis(20),
            },
        );
        let started = std::time::Instant::now();
        let _ = coordinator
            .run(&Target::Best, |_| async { Err::<(), _>(MeasurementError::Parse("junk".to_string())) })
            .await
            .unwrap();
        // 20ms after attempt 1, 40ms after attempt 2
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            FailureClass::of(&MeasurementError::Transient("x".to_string())),
            FailureClass::RateLimited
        );
        assert_eq!(
            FailureClass::of(&MeasurementError::LicenseRequired("x".to_string())),
            FailureClass::License
        );
        assert_eq!(
            FailureClass::of(&MeasurementError::EngineFailure {
                code: Some(1),
                message: "HTTP Error 403: Forbidden".to_string(),
            }),
            FailureClass::RateLimited
        );
        assert_eq!(
            FailureClass::of(&MeasurementError::Parse("unexpected token".to_string())),
            FailureClass::Generic
        );
    }

    #[test]
    fn test_zero_attempts_is_clamped_to_one() {
        assert_eq!(immediate(0).max_attempts(), 1);
    }
}
