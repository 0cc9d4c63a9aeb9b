//! Reconnection Policy
//!
//! Fixed-delay, unlimited retry for upstream connections. The delay never
//! grows and there is no attempt cap; the owning loop stops only on
//! cancellation.

use std::time::Duration;

/// Default delay between exchange reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Fixed-delay reconnection policy.
///
/// # Example
///
/// ```rust
/// use market_data_service::infrastructure::feeds::ReconnectPolicy;
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(Duration::from_secs(5));
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// assert_eq!(policy.attempt_count(), 1);
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempt_count: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Create a policy that always waits `delay`.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt. Counts the attempt.
    pub const fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.delay
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts since the last successful connection.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delay_is_five_seconds() {
        assert_eq!(ReconnectPolicy::default().delay(), Duration::from_secs(5));
    }

    #[test]
    fn delay_never_grows() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(250));
        for attempt in 1..=50 {
            assert_eq!(policy.next_delay(), Duration::from_millis(250));
            assert_eq!(policy.attempt_count(), attempt);
        }
    }

    #[test]
    fn reset_clears_attempts() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1));
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
    }
}
