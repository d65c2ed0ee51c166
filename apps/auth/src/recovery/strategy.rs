//! Recovery Strategy Table — deterministic lookup from a failure class to
//! the action the machine should take next. No side effects; the attempt
//! budget lives in the context so the table stays a pure function.

use crate::recovery::classify::FailureClass;

/// What the machine should do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Schedule another full recovery cycle (clear, settle, refresh).
    Retry,
    /// Stop automating; send the user to manual login.
    Redirect,
    /// Schedule a non-destructive cycle: re-validate and refresh without
    /// clearing credentials again.
    Refresh,
    /// Surface the error to the caller unchanged.
    Ignore,
}

/// Call-site context for the lookup.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext {
    pub is_public_page: bool,
    pub attempts_so_far: u32,
    pub max_attempts: u32,
}

/// The table itself.
///
/// - `ExistingSession` retries while budget remains, then redirects.
/// - `AllSessionsClearFailed` always redirects: repeating a destructive
///   clear-all without new information cannot plausibly succeed.
/// - `Transport` gets a non-destructive refresh while budget remains.
/// - `Unauthorized` redirects, except on public pages where there is no
///   login wall to bounce back to.
pub fn strategy_for(class: FailureClass, ctx: &StrategyContext) -> RecoveryAction {
    let budget_left = ctx.attempts_so_far < ctx.max_attempts;
    match class {
        FailureClass::ExistingSession if budget_left => RecoveryAction::Retry,
        FailureClass::ExistingSession => RecoveryAction::Redirect,
        FailureClass::Transport if budget_left => RecoveryAction::Refresh,
        FailureClass::Transport => RecoveryAction::Redirect,
        FailureClass::AllSessionsClearFailed => RecoveryAction::Redirect,
        FailureClass::Unauthorized if ctx.is_public_page => RecoveryAction::Ignore,
        FailureClass::Unauthorized => RecoveryAction::Redirect,
        FailureClass::Unknown => RecoveryAction::Ignore,
    }
}
