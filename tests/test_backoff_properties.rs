//! Property tests for the reconnection policy

use proptest::prelude::*;
use std::time::Duration;
use wsrelay::manager::{HealthMonitor, ReconnectConfig, ReconnectionDecision};

proptest! {
    #[test]
    fn delay_doubles_per_attempt(base in 1u64..10_000, attempts in 0u32..20) {
        let config = ReconnectConfig { max_attempts: 32, base_delay_ms: base };

        let delay = config.calculate_backoff_delay(attempts);
        let next = config.calculate_backoff_delay(attempts + 1);

        prop_assert_eq!(delay, Duration::from_millis(base << attempts));
        prop_assert_eq!(next, delay * 2);
    }

    #[test]
    fn delay_never_overflows(base in 1u64..u64::MAX, attempts in 0u32..200) {
        let config = ReconnectConfig { max_attempts: 5, base_delay_ms: base };
        let delay = config.calculate_backoff_delay(attempts);
        prop_assert!(delay >= Duration::from_millis(base));
    }

    #[test]
    fn proceeds_only_below_the_cap(max in 1u32..20, attempts in 0u32..40) {
        let config = ReconnectConfig { max_attempts: max, base_delay_ms: 1000 };

        match HealthMonitor::should_attempt_reconnection(attempts, &config, false) {
            ReconnectionDecision::Proceed { attempt, delay } => {
                prop_assert!(attempts < max);
                prop_assert_eq!(attempt, attempts + 1);
                prop_assert_eq!(delay, config.calculate_backoff_delay(attempts));
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => prop_assert!(attempts >= max),
            ReconnectionDecision::AbortShutdownRequested => prop_assert!(false, "no shutdown requested"),
        }
    }

    #[test]
    fn shutdown_always_aborts(max in 1u32..20, attempts in 0u32..40) {
        let config = ReconnectConfig { max_attempts: max, base_delay_ms: 1000 };
        prop_assert_eq!(
            HealthMonitor::should_attempt_reconnection(attempts, &config, true),
            ReconnectionDecision::AbortShutdownRequested
        );
    }

    #[test]
    fn total_wait_is_geometric_sum(base in 1u64..10_000, max in 1u32..16) {
        let config = ReconnectConfig { max_attempts: max, base_delay_ms: base };
        prop_assert_eq!(
            config.calculate_max_total_time(),
            Duration::from_millis(base * ((1u64 << max) - 1))
        );
    }
}

#[test]
fn default_schedule_is_one_to_sixteen_seconds() {
    let config = ReconnectConfig::default();
    let delays: Vec<u64> = (0..5)
        .map(|n| config.calculate_backoff_delay(n).as_millis() as u64)
        .collect();
    assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    assert_eq!(config.calculate_max_total_time(), Duration::from_secs(31));
}
