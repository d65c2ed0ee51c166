//! Session-conflict detection and recovery for the client.
//!
//! When a login collides with an already-active server-side session, the
//! resolver classifies the failure and drives a bounded validate → clear →
//! settle → refresh → retry sequence, handing off to a manual path when the
//! attempt budget runs out. The auth store is the one place the rest of the
//! client reads "am I logged in, and is there a conflict being resolved."

pub mod config;
pub mod errors;
pub mod models;
pub mod provider;
pub mod recovery;
pub mod store;

pub use config::Config;
pub use errors::AuthError;
pub use models::conflict::{ConflictCategory, ConflictRecord, ErrorInfo, ResolutionMethod};
pub use models::session::{Identity, Session};
pub use provider::{HttpIdentityProvider, IdentityProvider, SessionGrant};
pub use recovery::classify::{classify, severity, FailureClass};
pub use recovery::machine::ResolutionState;
pub use recovery::resolver::{ConflictResolver, LoginOutcome, ResolutionView};
pub use recovery::strategy::{strategy_for, RecoveryAction, StrategyContext};
pub use recovery::RecoveryPolicy;
pub use store::persist::CredentialCache;
pub use store::AuthStore;
