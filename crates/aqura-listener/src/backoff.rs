use std::time::Duration;

/// Delay schedule between reconnect attempts.
///
/// Starts at `min_interval`, doubles with every failed attempt and never
/// exceeds `max_interval`. There is no attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            min_interval,
            max_interval: max_interval.max(min_interval),
        }
    }

    /// Delay before the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.min_interval
            .saturating_mul(factor)
            .min(self.max_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_secs(20));
        assert_eq!(policy.delay_for(2), Duration::from_secs(40));
        assert_eq!(policy.delay_for(3), Duration::from_secs(60));
        assert_eq!(policy.delay_for(10), Duration::from_secs(60));
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(60));
        assert_eq!(policy.delay_for(31), Duration::from_secs(60));
        assert_eq!(policy.delay_for(32), Duration::from_secs(60));
    }

    #[test]
    fn test_max_is_never_below_min() {
        let policy = ReconnectPolicy::new(Duration::from_secs(30), Duration::from_secs(5));
        assert_eq!(policy.max_interval, Duration::from_secs(30));
        assert_eq!(policy.delay_for(4), Duration::from_secs(30));
    }
}
