//! Expiration policy: pure functions of `(SwitchState, now)`.

use serde::{Deserialize, Serialize};

use crate::account::SwitchState;

/// Result of evaluating a switch at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expiration {
    /// Deadline has been reached (time-expired).
    pub is_expired: bool,
    /// `last_ping + ping_interval`; `None` when that overflows.
    pub expiration_time: Option<i64>,
    /// Seconds until the deadline, never negative.
    pub time_remaining: i64,
    /// Sticky on-chain flag (flag-expired).
    pub flag_expired: bool,
}

/// Lifecycle position of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SwitchStatus {
    /// Deadline ahead, flag clear.
    Active,
    /// Deadline passed, nobody has marked it yet.
    TimeExpired,
    /// Flag set. Terminal.
    FlagExpired,
}

/// Which expiry signal permits decryption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    /// Deadline passed, flag not required.
    Time,
    /// Sticky flag set on-chain; matches the flag-check predicate the oracle evaluates.
    #[default]
    Flag,
    /// Either signal.
    Either,
}

impl Eligibility {
    /// Applies the rule to an evaluation.
    #[must_use]
    pub const fn permits(self, expiration: &Expiration) -> bool {
        match self {
            Self::Time => expiration.is_expired,
            Self::Flag => expiration.flag_expired,
            Self::Either => expiration.is_expired || expiration.flag_expired,
        }
    }
}

/// `last_ping + ping_interval`, checked as `last_ping <= i64::MAX - ping_interval`.
#[must_use]
pub fn expiration_time(state: &SwitchState) -> Option<i64> {
    state.last_ping.checked_add(state.ping_interval)
}

/// Evaluates a switch at `now`. Overflow counts as expired.
#[must_use]
pub fn evaluate(state: &SwitchState, now: i64) -> Expiration {
    let expiration_time = expiration_time(state);
    let (is_expired, time_remaining) = match expiration_time {
        Some(deadline) => (now >= deadline, deadline.saturating_sub(now).max(0)),
        None => (true, 0),
    };
    Expiration {
        is_expired,
        expiration_time,
        time_remaining,
        flag_expired: state.expired_flag,
    }
}

/// Maps an evaluation onto the lifecycle.
#[must_use]
pub fn classify(state: &SwitchState, now: i64) -> SwitchStatus {
    let expiration = evaluate(state, now);
    if expiration.flag_expired {
        SwitchStatus::FlagExpired
    } else if expiration.is_expired {
        SwitchStatus::TimeExpired
    } else {
        SwitchStatus::Active
    }
}
