//! Conflict detection and recovery for login collisions.
//!
//! A failed login is classified (`classify`), looked up in the strategy
//! table (`strategy`), and, when recoverable, driven through a bounded
//! sequence of validate → clear → settle → refresh cycles by the resolution
//! machine (`machine` holds the pure reducer, `resolver` runs the effects
//! and owns the timers). The validity oracle (`oracle`) is consulted before
//! anything destructive happens.

use std::time::Duration;

pub mod classify;
pub mod machine;
pub mod oracle;
pub mod resolver;
pub mod strategy;

/// Timing and budget knobs for a resolution sequence. Production uses the
/// defaults; tests shrink them.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    /// Automatic cycle budget for one conflict record.
    pub max_attempts: u32,
    /// Pause after clearing credentials, letting the provider's side
    /// effects propagate before re-validating.
    pub settle_delay: Duration,
    /// Seconds on the auto-retry countdown between failed cycles.
    pub retry_countdown_secs: u32,
    /// How long a resolved conflict stays visible before the in-progress
    /// indicator is dismissed. A UX contract, not a correctness one.
    pub success_linger: Duration,
    /// Whether the surrounding page has no login wall to bounce back to.
    pub on_public_page: bool,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            settle_delay: Duration::from_millis(800),
            retry_countdown_secs: 5,
            success_linger: Duration::from_millis(1500),
            on_public_page: false,
        }
    }
}
