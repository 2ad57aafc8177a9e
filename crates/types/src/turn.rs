//! Host-facing value types: model descriptors, turn lifecycle events,
//! notification severity and message delivery modes.

use crate::ProviderId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A concrete model the host can switch to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub provider: ProviderId,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ModelDescriptor {
    pub fn new(provider: impl Into<ProviderId>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
            name: None,
        }
    }

    /// `"provider/model"`, the form used by group entries.
    #[must_use]
    pub fn endpoint_id(&self) -> String {
        format!("{}/{}", self.provider, self.id)
    }
}

/// Why the host stopped producing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Length,
    ToolUse,
    Error,
    Aborted,
}

/// Emitted by the host when a turn begins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnStart {
    /// Content of the user message that started the turn, if the turn was
    /// started by one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_content: Option<Value>,
}

/// Emitted by the host when a turn completes, successfully or not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnEnd {
    /// The message produced by the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl TurnEnd {
    /// A failed turn carrying only an error text.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            message: None,
            error: Some(error.into()),
            stop_reason: Some(StopReason::Error),
        }
    }

    /// The error text to classify.
    ///
    /// Prefers the explicit `error` field; when absent and the turn stopped
    /// with an error, falls back to the message's `errorMessage` field.
    #[must_use]
    pub fn error_text(&self) -> Option<&str> {
        if let Some(e) = self.error.as_deref().filter(|e| !e.is_empty()) {
            return Some(e);
        }
        if self.stop_reason != Some(StopReason::Error) {
            return None;
        }
        self.message
            .as_ref()
            .and_then(|m| m.get("errorMessage"))
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
    }
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// How a resent message is delivered to the host's message queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Interrupt the current turn.
    Steer,
    /// Deliver once the current turn has finished.
    FollowUp,
}
