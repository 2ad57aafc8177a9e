//! Core types and traits for the rotakey workspace.
//!
//! This crate defines the shared vocabulary of the failover engine: provider
//! and endpoint identifiers, opaque credential blobs, host turn events, the
//! error type, and the credential store abstraction.

pub mod credential;
pub mod error;
pub mod provider;
pub mod traits;
pub mod turn;

pub use credential::{Credential, CredentialSet, PRIMARY_CREDENTIAL};
pub use error::{Result, RotakeyError};
pub use provider::{EndpointRef, ProviderId};
pub use traits::CredentialStore;
pub use turn::{DeliveryMode, ModelDescriptor, Severity, StopReason, TurnEnd, TurnStart};
