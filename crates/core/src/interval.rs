use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pure interval policy for the poll loop.
///
/// A slow cycle pushes the interval up to the observed duration, capped at
/// `backoff_factor` times the current value. Fast cycles walk it back down by
/// `decay_step` until it reaches `base` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalPolicy {
    pub base: Duration,
    pub decay_step: Duration,
    pub backoff_factor: u32,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        IntervalPolicy {
            base: Duration::from_millis(5000),
            decay_step: Duration::from_millis(1000),
            backoff_factor: 10,
        }
    }
}

impl IntervalPolicy {
    pub fn next(&self, current: Duration, observed: Duration) -> Duration {
        if observed > current {
            observed.min(current.saturating_mul(self.backoff_factor))
        } else if current > self.base {
            current.saturating_sub(self.decay_step).max(self.base)
        } else {
            self.base
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveInterval {
    policy: IntervalPolicy,
    current: Duration,
}

impl AdaptiveInterval {
    pub fn new(policy: IntervalPolicy) -> Self {
        AdaptiveInterval {
            policy,
            current: policy.base,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn policy(&self) -> &IntervalPolicy {
        &self.policy
    }

    /// Feeds the duration of a completed cycle and returns the next wait.
    pub fn observe(&mut self, observed: Duration) -> Duration {
        self.current = self.policy.next(self.current, observed);
        self.current
    }

    /// Back to base, used after an unreachable-server skip.
    pub fn reset(&mut self) -> Duration {
        self.current = self.policy.base;
        self.current
    }
}
