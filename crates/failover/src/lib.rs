//! The rotakey failover decision engine.
//!
//! The host reports each turn to a [`FailoverEngine`]. When a turn fails
//! with a quota or capacity error the engine puts the failing credential or
//! endpoint into cooldown, rotates to the next credential of the same
//! provider, or else to the next endpoint of the active group, and resends
//! the user's message once.

pub mod classify;
pub mod clock;
pub mod credential;
pub mod endpoint;
pub mod engine;
pub mod exhaustion;
pub mod host;
pub mod retry;

#[cfg(test)]
mod testing;

pub use classify::{ErrorClassifier, FailureKind, classify};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    Cooldown, CredentialStatus, EntryStatus, FailoverEngine, FailoverOutcome, FailoverState,
    IgnoreReason, StatusReport, SyncReport, SyncResult,
};
pub use exhaustion::ExhaustionRegistry;
pub use host::{HostApi, ModelLookup};
pub use retry::{RetryCoordinator, RetryDecision};
