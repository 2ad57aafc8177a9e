//! Async traits shared across rotakey crates.
//!
//! Cross-crate storage abstractions are defined here so that the engine
//! depends only on `rotakey-types`, not on a concrete store.

use crate::{Credential, ProviderId, Result};
use async_trait::async_trait;

/// The store the host itself reads to authenticate outgoing requests.
///
/// Holds exactly one **active** credential blob per provider. Switching a
/// credential means copying a blob from the
/// [`CredentialSet`](crate::CredentialSet) into this store.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the active credential of the given provider.
    async fn load_active(&self, provider: &ProviderId) -> Result<Option<Credential>>;

    /// Replace the active credential of the given provider.
    async fn save_active(&self, provider: &ProviderId, credential: &Credential) -> Result<()>;

    /// Providers that currently have an active credential.
    async fn providers(&self) -> Result<Vec<ProviderId>> {
        Ok(Vec::new())
    }
}
