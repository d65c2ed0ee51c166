//! Conflict Resolution State Machine — the pure core.
//!
//! # Architecture
//! State is an explicit tagged union, and `reduce` is a pure function from
//! (state, event) to (next state, effects). Timers, network calls, and store
//! writes all live in the effect runner (`resolver.rs`); nothing here has a
//! side effect, so every transition is unit-testable in isolation and there
//! is no ambiguity about what is current state versus a stale callback.

use crate::models::conflict::ErrorInfo;
use crate::models::session::{Identity, Session};
use crate::recovery::classify::FailureClass;
use crate::recovery::strategy::{strategy_for, RecoveryAction, StrategyContext};
use crate::recovery::RecoveryPolicy;

/// Where a resolution sequence currently stands.
///
/// `Idle` is initial. `Success` and `Exhausted` are terminal for the current
/// login cycle; a new login attempt always resets to `Idle` first.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionState {
    Idle,
    /// A recovery cycle (validate → clear → settle → refresh) is running.
    Attempting { attempt: u32 },
    /// A cycle failed; the next one fires when the countdown reaches zero.
    AwaitingRetry {
        attempt: u32,
        remaining_secs: u32,
        /// Whether the next cycle clears credentials again, or just
        /// re-validates (the non-destructive path after transport trouble).
        destructive_next: bool,
    },
    Success,
    Exhausted,
}

impl ResolutionState {
    /// True while the machine owns the credential blob and a second
    /// resolution must not start.
    pub fn in_progress(&self) -> bool {
        matches!(
            self,
            ResolutionState::Attempting { .. } | ResolutionState::AwaitingRetry { .. }
        )
    }

    /// Seconds left on the auto-retry countdown, if one is pending.
    pub fn countdown(&self) -> Option<u32> {
        match self {
            ResolutionState::AwaitingRetry { remaining_secs, .. } => Some(*remaining_secs),
            _ => None,
        }
    }
}

/// Everything that can happen to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionEvent {
    /// A login call failed with a conflict-classified error.
    ConflictDetected,
    /// The running cycle produced a usable session.
    CycleSucceeded { identity: Identity, session: Session },
    /// The running cycle failed; the error has been re-classified.
    CycleFailed { class: FailureClass, info: ErrorInfo },
    /// One second of countdown elapsed.
    Tick,
    /// The user asked to skip the countdown (or to try again after
    /// exhaustion).
    RetryNow,
    /// The success indicator has been shown long enough.
    LingerElapsed,
    /// A new login attempt (or logout) supersedes this resolution.
    Cancelled,
}

/// Side effects the runner must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create or bump the conflict record for a new attempt.
    RecordStart,
    /// Run a recovery cycle: oracle probe, then (if `destructive`) clear
    /// credentials, settle, and refresh.
    StartCycle { attempt: u32, destructive: bool },
    /// Start the one-second-tick countdown timer.
    StartCountdown { seconds: u32 },
    /// Kill any outstanding scheduled task.
    CancelTimer,
    /// Install the recovered credentials and mark the record resolved.
    RecordSuccess { identity: Identity, session: Session },
    /// Record the classified failure on the conflict record.
    RecordFailure { class: FailureClass, info: ErrorInfo },
    /// Keep the success indicator up for the linger delay, then dismiss.
    ScheduleLinger,
    /// Drop the conflict record entirely.
    DiscardRecord,
}

/// A transition: the state the machine moves to and what the runner must do.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: ResolutionState,
    pub effects: Vec<Effect>,
}

fn stay(state: &ResolutionState) -> Transition {
    Transition {
        next: state.clone(),
        effects: vec![],
    }
}

/// The reducer. Pure: no clocks, no randomness, no I/O.
pub fn reduce(
    state: &ResolutionState,
    event: ResolutionEvent,
    policy: &RecoveryPolicy,
) -> Transition {
    use ResolutionEvent::*;
    use ResolutionState::*;

    match (state, event) {
        // A conflict only starts a sequence from rest; the resolver rejects
        // overlapping starts before they ever reach the reducer.
        (Idle, ConflictDetected) => Transition {
            next: Attempting { attempt: 1 },
            effects: vec![
                Effect::RecordStart,
                Effect::StartCycle {
                    attempt: 1,
                    destructive: true,
                },
            ],
        },

        (Attempting { .. }, CycleSucceeded { identity, session }) => Transition {
            next: Success,
            effects: vec![
                Effect::RecordSuccess { identity, session },
                Effect::ScheduleLinger,
            ],
        },

        (Attempting { attempt }, CycleFailed { class, info }) => {
            let ctx = StrategyContext {
                is_public_page: policy.on_public_page,
                attempts_so_far: *attempt,
                max_attempts: policy.max_attempts,
            };
            match strategy_for(class, &ctx) {
                RecoveryAction::Retry => Transition {
                    next: AwaitingRetry {
                        attempt: *attempt,
                        remaining_secs: policy.retry_countdown_secs,
                        destructive_next: true,
                    },
                    effects: vec![
                        Effect::RecordFailure { class, info },
                        Effect::StartCountdown {
                            seconds: policy.retry_countdown_secs,
                        },
                    ],
                },
                RecoveryAction::Refresh => Transition {
                    next: AwaitingRetry {
                        attempt: *attempt,
                        remaining_secs: policy.retry_countdown_secs,
                        destructive_next: false,
                    },
                    effects: vec![
                        Effect::RecordFailure { class, info },
                        Effect::StartCountdown {
                            seconds: policy.retry_countdown_secs,
                        },
                    ],
                },
                RecoveryAction::Redirect | RecoveryAction::Ignore => Transition {
                    next: Exhausted,
                    effects: vec![Effect::RecordFailure { class, info }],
                },
            }
        }

        (
            AwaitingRetry {
                attempt,
                remaining_secs,
                destructive_next,
            },
            Tick,
        ) => {
            if *remaining_secs > 1 {
                Transition {
                    next: AwaitingRetry {
                        attempt: *attempt,
                        remaining_secs: remaining_secs - 1,
                        destructive_next: *destructive_next,
                    },
                    effects: vec![],
                }
            } else {
                let next_attempt = attempt + 1;
                Transition {
                    next: Attempting {
                        attempt: next_attempt,
                    },
                    effects: vec![
                        Effect::RecordStart,
                        Effect::StartCycle {
                            attempt: next_attempt,
                            destructive: *destructive_next,
                        },
                    ],
                }
            }
        }

        (
            AwaitingRetry {
                attempt,
                destructive_next,
                ..
            },
            RetryNow,
        ) => {
            let next_attempt = attempt + 1;
            Transition {
                next: Attempting {
                    attempt: next_attempt,
                },
                effects: vec![
                    Effect::CancelTimer,
                    Effect::RecordStart,
                    Effect::StartCycle {
                        attempt: next_attempt,
                        destructive: *destructive_next,
                    },
                ],
            }
        }

        // Manual retry after exhaustion starts a fresh sequence with a fresh
        // record, keeping the attempts invariant intact.
        (Exhausted, RetryNow) => Transition {
            next: Attempting { attempt: 1 },
            effects: vec![
                Effect::CancelTimer,
                Effect::DiscardRecord,
                Effect::RecordStart,
                Effect::StartCycle {
                    attempt: 1,
                    destructive: true,
                },
            ],
        },

        // The manual clear path reports back into the machine from
        // `Exhausted`.
        (Exhausted, CycleSucceeded { identity, session }) => Transition {
            next: Success,
            effects: vec![
                Effect::RecordSuccess { identity, session },
                Effect::ScheduleLinger,
            ],
        },
        (Exhausted, CycleFailed { class, info }) => Transition {
            next: Exhausted,
            effects: vec![Effect::RecordFailure { class, info }],
        },

        (Success, LingerElapsed) => Transition {
            next: Success,
            effects: vec![Effect::DiscardRecord],
        },

        (_, Cancelled) => Transition {
            next: Idle,
            effects: vec![Effect::CancelTimer, Effect::DiscardRecord],
        },

        // Everything else is a stale callback firing against a state that
        // has moved on. Defuse it.
        (state, _) => stay(state),
    }
}
