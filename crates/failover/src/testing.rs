//! A scripted host for tests.

use crate::host::{HostApi, ModelLookup};
use async_trait::async_trait;
use rotakey_types::{DeliveryMode, ModelDescriptor, ProviderId, Result, RotakeyError, Severity};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Recorded {
    current: Option<ModelDescriptor>,
    listed: Vec<String>,
    switches: Vec<ModelDescriptor>,
    resends: Vec<(Value, DeliveryMode)>,
    notifications: Vec<(String, Severity)>,
}

#[derive(Debug, Default)]
pub struct FakeHost {
    models: Vec<ModelDescriptor>,
    uncredentialed: HashSet<String>,
    declined: HashSet<String>,
    fail_resend: bool,
    yield_on_current: bool,
    recorded: Mutex<Recorded>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(mut self, provider: &str, ids: &[&str]) -> Self {
        self.models
            .extend(ids.iter().map(|id| ModelDescriptor::new(provider, *id)));
        self
    }

    pub fn without_credential(mut self, provider: &str, model: &str) -> Self {
        self.uncredentialed.insert(format!("{provider}/{model}"));
        self
    }

    /// `switch_active_model` answers `false` for this model.
    pub fn declining(mut self, provider: &str, model: &str) -> Self {
        self.declined.insert(format!("{provider}/{model}"));
        self
    }

    pub fn failing_resend(mut self) -> Self {
        self.fail_resend = true;
        self
    }

    /// `current_model` yields to the scheduler once before answering.
    pub fn yielding(mut self) -> Self {
        self.yield_on_current = true;
        self
    }

    pub fn current(self, provider: &str, model: &str) -> Self {
        self.set_current(ModelDescriptor::new(provider, model));
        self
    }

    pub fn set_current(&self, model: ModelDescriptor) {
        self.recorded.lock().unwrap().current = Some(model);
    }

    pub fn current_model_now(&self) -> Option<ModelDescriptor> {
        self.recorded.lock().unwrap().current.clone()
    }

    pub fn listed_providers(&self) -> Vec<String> {
        self.recorded.lock().unwrap().listed.clone()
    }

    pub fn switches(&self) -> Vec<ModelDescriptor> {
        self.recorded.lock().unwrap().switches.clone()
    }

    pub fn resends(&self) -> Vec<(Value, DeliveryMode)> {
        self.recorded.lock().unwrap().resends.clone()
    }

    pub fn notifications(&self) -> Vec<(String, Severity)> {
        self.recorded.lock().unwrap().notifications.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .filter(|(_, s)| *s == Severity::Error)
            .map(|(t, _)| t)
            .collect()
    }
}

#[async_trait]
impl ModelLookup for FakeHost {
    async fn list_available_models(&self, provider: &ProviderId) -> Vec<ModelDescriptor> {
        self.recorded
            .lock()
            .unwrap()
            .listed
            .push(provider.to_string());
        self.models
            .iter()
            .filter(|m| &m.provider == provider)
            .cloned()
            .collect()
    }

    async fn credential_for_model(&self, model: &ModelDescriptor) -> Option<String> {
        let id = model.endpoint_id();
        (!self.uncredentialed.contains(&id)).then(|| format!("key-for-{id}"))
    }
}

#[async_trait]
impl HostApi for FakeHost {
    async fn current_model(&self) -> Option<ModelDescriptor> {
        if self.yield_on_current {
            tokio::task::yield_now().await;
        }
        self.current_model_now()
    }

    async fn switch_active_model(&self, model: &ModelDescriptor) -> Result<bool> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.switches.push(model.clone());
        if self.declined.contains(&model.endpoint_id()) {
            return Ok(false);
        }
        recorded.current = Some(model.clone());
        Ok(true)
    }

    async fn resend_last_message(&self, content: &Value, mode: DeliveryMode) -> Result<()> {
        if self.fail_resend {
            return Err(RotakeyError::Host("resend rejected".into()));
        }
        self.recorded
            .lock()
            .unwrap()
            .resends
            .push((content.clone(), mode));
        Ok(())
    }

    async fn notify_user(&self, text: &str, severity: Severity) {
        self.recorded
            .lock()
            .unwrap()
            .notifications
            .push((text.to_string(), severity));
    }
}
