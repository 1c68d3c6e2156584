use chrono::{DateTime, Utc};

use crate::registry::ChannelHealth;

/// Hysteresis over raw probe outcomes.
///
/// A single failed probe never flips a channel offline: the transition
/// happens only when the consecutive-failure streak reaches the
/// threshold, so one or two transient blips leave the public catalogue
/// untouched. Any success clears the streak.
#[derive(Debug, Clone, Copy)]
pub struct LivenessPolicy {
    failure_threshold: u32,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
        }
    }
}

impl LivenessPolicy {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Pure transition: prior health + one probe outcome -> next health.
    /// `now` is the probe completion time, injected so the function stays
    /// deterministic.
    pub fn apply(&self, prior: &ChannelHealth, reachable: bool, now: DateTime<Utc>) -> ChannelHealth {
        if reachable {
            return ChannelHealth {
                is_online: true,
                consecutive_failures: 0,
                last_checked: Some(now),
            };
        }
        let failures = prior.consecutive_failures.saturating_add(1);
        ChannelHealth {
            is_online: failures < self.failure_threshold,
            consecutive_failures: failures,
            last_checked: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(is_online: bool, failures: u32) -> ChannelHealth {
        ChannelHealth {
            is_online,
            consecutive_failures: failures,
            last_checked: None,
        }
    }

    #[test]
    fn fresh_channel_is_optimistically_online() {
        let health = ChannelHealth::default();
        assert!(health.is_online);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_checked.is_none());
    }

    #[test]
    fn goes_offline_exactly_at_threshold() {
        let policy = LivenessPolicy::new(3);
        let now = Utc::now();

        let at_edge = policy.apply(&health(true, 2), false, now);
        assert!(!at_edge.is_online);
        assert_eq!(at_edge.consecutive_failures, 3);

        let below_edge = policy.apply(&health(true, 1), false, now);
        assert!(below_edge.is_online);
        assert_eq!(below_edge.consecutive_failures, 2);
    }

    #[test]
    fn success_resets_streak_from_any_depth() {
        let policy = LivenessPolicy::default();
        let now = Utc::now();
        for failures in [0, 1, 3, 250] {
            let next = policy.apply(&health(false, failures), true, now);
            assert!(next.is_online);
            assert_eq!(next.consecutive_failures, 0);
            assert_eq!(next.last_checked, Some(now));
        }
    }

    #[test]
    fn apply_is_deterministic() {
        let policy = LivenessPolicy::default();
        let now = Utc::now();
        let prior = health(true, 1);
        let first = policy.apply(&prior, false, now);
        let second = policy.apply(&prior, false, now);
        assert_eq!(first, second);
    }

    #[test]
    fn default_threshold_absorbs_two_blips() {
        let policy = LivenessPolicy::default();
        let now = Utc::now();
        let mut state = ChannelHealth::default();
        state = policy.apply(&state, false, now);
        assert!(state.is_online);
        state = policy.apply(&state, false, now);
        assert!(state.is_online);
        state = policy.apply(&state, false, now);
        assert!(!state.is_online);
        assert_eq!(state.consecutive_failures, 3);
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let policy = LivenessPolicy::new(0);
        assert_eq!(policy.failure_threshold(), 1);
        let next = policy.apply(&ChannelHealth::default(), false, Utc::now());
        assert!(!next.is_online);
    }
}
