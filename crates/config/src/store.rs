//! Persistence contract for [`Config`].

use crate::Config;
use async_trait::async_trait;
use rotakey_types::Result;

/// Loads and saves the durable configuration.
///
/// The engine treats the backing file as exclusively its own while running:
/// there is no optimistic concurrency, so concurrent external edits during a
/// write may be lost.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the configuration; `Ok(None)` when none has been saved yet.
    async fn load_config(&self) -> Result<Option<Config>>;

    /// Persist the configuration, replacing what was stored.
    async fn save_config(&self, config: &Config) -> Result<()>;
}
