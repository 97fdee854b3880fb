//! Reconnect backoff policy.

use std::time::Duration;

/// Capped exponential backoff: `delay(n) = min(base^n, cap)` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Growth factor per attempt.
    pub base: f64,
    /// Upper bound for a single delay.
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: std::f64::consts::E,
            cap: Duration::from_millis(20_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let cap_ms = self.cap.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let ms = self.base.powi(exponent);
        if !ms.is_finite() || ms >= cap_ms {
            return self.cap;
        }
        Duration::from_millis(ms.max(0.0) as u64)
    }
}
