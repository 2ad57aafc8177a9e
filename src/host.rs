//! Host stand-in for one-shot CLI commands.
//!
//! CLI commands only touch configuration and credentials; no agent loop is
//! attached, so there is no model to switch and no message to resend.

use async_trait::async_trait;
use rotakey_failover::{HostApi, ModelLookup};
use rotakey_types::{DeliveryMode, ModelDescriptor, ProviderId, Result, RotakeyError, Severity};
use serde_json::Value;

#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

#[async_trait]
impl ModelLookup for DetachedHost {
    async fn list_available_models(&self, _provider: &ProviderId) -> Vec<ModelDescriptor> {
        Vec::new()
    }

    async fn credential_for_model(&self, _model: &ModelDescriptor) -> Option<String> {
        None
    }
}

#[async_trait]
impl HostApi for DetachedHost {
    async fn current_model(&self) -> Option<ModelDescriptor> {
        None
    }

    async fn switch_active_model(&self, model: &ModelDescriptor) -> Result<bool> {
        tracing::debug!(model = %model.endpoint_id(), "no host attached, declining switch");
        Ok(false)
    }

    async fn resend_last_message(&self, _content: &Value, _mode: DeliveryMode) -> Result<()> {
        Err(RotakeyError::Host("no host attached".into()))
    }

    async fn notify_user(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!("{text}"),
            Severity::Warning => tracing::warn!("{text}"),
            Severity::Error => tracing::error!("{text}"),
        }
    }
}
