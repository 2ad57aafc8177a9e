//! The host agent runtime, as seen by the engine.

use async_trait::async_trait;
use rotakey_types::{DeliveryMode, ModelDescriptor, ProviderId, Result, Severity};
use serde_json::Value;

/// Model availability queries, the part of the host the endpoint rotator
/// needs.
#[async_trait]
pub trait ModelLookup: Send + Sync {
    /// Models the host can serve for `provider`, in the host's enumeration
    /// order. The engine never reorders this list: "first available model"
    /// always means the first element returned here.
    async fn list_available_models(&self, provider: &ProviderId) -> Vec<ModelDescriptor>;

    /// An opaque key proving `model` has a usable credential, if any.
    async fn credential_for_model(&self, model: &ModelDescriptor) -> Option<String>;
}

/// Everything the engine asks of the host.
#[async_trait]
pub trait HostApi: ModelLookup {
    /// The model that served the most recent turn.
    async fn current_model(&self) -> Option<ModelDescriptor>;

    /// Ask the host to make `model` active. `Ok(false)` means the host
    /// declined, e.g. because the model has no usable credential.
    async fn switch_active_model(&self, model: &ModelDescriptor) -> Result<bool>;

    /// Fire-and-forget redispatch of a user message. Starts a new turn.
    async fn resend_last_message(&self, content: &Value, mode: DeliveryMode) -> Result<()>;

    /// Show a notification to the user.
    async fn notify_user(&self, text: &str, severity: Severity);
}
