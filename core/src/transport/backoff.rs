use std::time::Duration;

/// Delay schedule between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// `min(base * 2^attempt, cap)`
    Exponential { base: Duration, cap: Duration },
    /// `base * attempt`
    Linear { base: Duration },
}

impl BackoffPolicy {
    /// Delay before reconnect number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            BackoffPolicy::Exponential { base, cap } => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(cap)
            }
            BackoffPolicy::Linear { base } => base.saturating_mul(attempt),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub backoff: BackoffPolicy,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    /// SSE schedule: 1s base doubling, capped at 30s.
    pub fn sse_default() -> Self {
        Self {
            backoff: BackoffPolicy::Exponential {
                base: Duration::from_millis(1000),
                cap: Duration::from_millis(30_000),
            },
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// WebSocket schedule: 3s times the attempt number.
    pub fn websocket_default() -> Self {
        Self {
            backoff: BackoffPolicy::Linear {
                base: Duration::from_millis(3000),
            },
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Given the failures already retried, return the next attempt number and
    /// its delay, or `None` once the budget is spent.
    pub fn next_attempt(&self, attempts_so_far: u32) -> Option<(u32, Duration)> {
        if attempts_so_far >= self.max_attempts {
            return None;
        }
        let attempt = attempts_so_far + 1;
        Some((attempt, self.backoff.delay_for(attempt)))
    }
}
