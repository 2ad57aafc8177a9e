//! The failover orchestrator.
//!
//! [`FailoverEngine`] owns every piece of mutable failover state: the config
//! snapshot, the cooldown registry, the active selection and the retry
//! episode. The host reports turn lifecycle events to it and the engine
//! answers a turn failure by rotating credentials, then endpoints, then
//! resending the user's message.

use crate::classify::{ClassifierRule, ErrorClassifier, FailureKind};
use crate::clock::{Clock, SystemClock};
use crate::credential::next_credential;
use crate::endpoint::{Candidate, EndpointScan, current_position};
use crate::exhaustion::ExhaustionRegistry;
use crate::host::HostApi;
use crate::retry::{RetryCoordinator, RetryDecision};
use rotakey_config::{Config, ConfigStore, CooldownScope, Group};
use rotakey_types::{
    CredentialStore, DeliveryMode, ModelDescriptor, ProviderId, Result, RotakeyError, Severity,
    TurnEnd, TurnStart,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Where the engine is within a failover episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverState {
    #[default]
    Idle,
    Classifying,
    CredentialRotating,
    EndpointRotating,
    Retrying,
    Exhausted,
}

impl fmt::Display for FailoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Classifying => "classifying",
            Self::CredentialRotating => "credential-rotating",
            Self::EndpointRotating => "endpoint-rotating",
            Self::Retrying => "retrying",
            Self::Exhausted => "exhausted",
        })
    }
}

/// Why a turn end did not start a failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoActiveGroup,
    RetryInFlight,
    NotAFailure,
}

/// What [`FailoverEngine::on_turn_end`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverOutcome {
    Ignored(IgnoreReason),
    CredentialRotated {
        provider: ProviderId,
        credential: String,
        retry: RetryDecision,
    },
    EndpointRotated {
        endpoint: String,
        model: ModelDescriptor,
        retry: RetryDecision,
    },
    /// Nothing in the active group was usable. The user was notified once.
    Exhausted,
}

/// One group entry in a [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryStatus {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
}

/// One provider's credentials in a [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub provider: ProviderId,
    pub active: Option<String>,
    pub names: Vec<String>,
}

/// A key in cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cooldown {
    pub key: String,
    pub remaining_ms: u64,
}

/// Snapshot returned by [`FailoverEngine::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub active_group: Option<String>,
    pub state: FailoverState,
    pub retrying: bool,
    pub entries: Vec<EntryStatus>,
    pub credentials: Vec<CredentialStatus>,
    pub cooldowns: Vec<Cooldown>,
}

/// Result of syncing one provider in [`FailoverEngine::sync_credentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum SyncResult {
    /// The store's blob equals this named credential, which is now active.
    Matched(String),
    /// The store's blob is not one of the named credentials.
    Unmatched,
    /// The store has no blob for this provider.
    NoActive,
    /// The provider had no named credentials; the store's blob was saved as
    /// `"primary"`.
    Imported,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub provider: ProviderId,
    #[serde(flatten)]
    pub result: SyncResult,
}

enum Rotation {
    Credential { provider: ProviderId, credential: String },
    Endpoint { candidate: Candidate },
}

struct EngineState {
    config: Config,
    classifier: ErrorClassifier,
    registry: ExhaustionRegistry,
    active_group: Option<String>,
    active_credentials: HashMap<ProviderId, String>,
    phase: FailoverState,
}

impl EngineState {
    /// The recorded active credential, else `"primary"`, else the first one.
    fn active_credential(&self, provider: &ProviderId) -> Option<String> {
        self.active_credentials
            .get(provider)
            .filter(|name| self.config.credentials.get(provider, name).is_some())
            .cloned()
            .or_else(|| self.config.credentials.preferred(provider).map(str::to_string))
    }

    fn active_group(&self) -> Option<(String, Group)> {
        let name = self.active_group.as_ref()?;
        let group = self.config.group(name)?;
        Some((name.clone(), group.clone()))
    }
}

/// Built-in rules plus every configured rule that compiles.
fn build_classifier(config: &Config) -> ErrorClassifier {
    let mut classifier = ErrorClassifier::builtin();
    for rule in &config.classifier.rules {
        match ClassifierRule::from_config(rule) {
            Ok(rule) => classifier.push(rule),
            Err(e) => tracing::warn!(error = %e, "skipping invalid classifier rule"),
        }
    }
    classifier
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// The failover decision engine.
pub struct FailoverEngine {
    config_store: Arc<dyn ConfigStore>,
    credential_store: Arc<dyn CredentialStore>,
    host: Arc<dyn HostApi>,
    retry: RetryCoordinator,
    state: Mutex<EngineState>,
}

#[bon::bon]
impl FailoverEngine {
    /// Build an engine. Without `config` the engine starts from defaults;
    /// call [`reload_config`](Self::reload_config) to read the store.
    #[builder]
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        credential_store: Arc<dyn CredentialStore>,
        host: Arc<dyn HostApi>,
        clock: Option<Arc<dyn Clock>>,
        config: Option<Config>,
    ) -> Self {
        let config = config.unwrap_or_default();
        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock));
        let state = EngineState {
            classifier: build_classifier(&config),
            registry: ExhaustionRegistry::new(clock),
            active_group: config.default_group.clone(),
            active_credentials: HashMap::new(),
            phase: FailoverState::Idle,
            config,
        };
        Self {
            config_store,
            credential_store,
            retry: RetryCoordinator::new(state.config.retry_lock()),
            host,
            state: Mutex::new(state),
        }
    }
}

impl FailoverEngine {
    /// A copy of the current configuration.
    pub async fn config(&self) -> Config {
        self.state.lock().await.config.clone()
    }

    /// Record the start of a turn.
    pub fn on_turn_start(&self, event: &TurnStart) {
        self.retry.on_turn_start(event.user_content.as_ref());
    }

    /// Handle the end of a turn. Never fails: every collaborator error is
    /// logged and absorbed.
    pub async fn on_turn_end(&self, event: &TurnEnd) -> FailoverOutcome {
        let mut guard = self.state.lock().await;
        // Checked under the state lock: a turn end queued behind an episode
        // must see the retry that episode started.
        if self.retry.is_retrying() {
            tracing::debug!("turn end ignored: retry in flight");
            return FailoverOutcome::Ignored(IgnoreReason::RetryInFlight);
        }
        let state = &mut *guard;
        let Some((group_name, group)) = state.active_group() else {
            return FailoverOutcome::Ignored(IgnoreReason::NoActiveGroup);
        };

        state.phase = FailoverState::Classifying;
        let current = self.host.current_model().await;
        let error = event.error_text();
        let Some(kind) = state
            .classifier
            .classify(error, current.as_ref().map(|m| &m.provider))
        else {
            state.phase = FailoverState::Idle;
            return FailoverOutcome::Ignored(IgnoreReason::NotAFailure);
        };
        let model = current.as_ref().map(ModelDescriptor::endpoint_id);
        tracing::warn!(
            kind = %kind,
            group = %group_name,
            model = ?model,
            error = error.unwrap_or_default(),
            "turn failed, starting failover"
        );

        let Some(rotation) = self.rotate(state, &group, current.as_ref(), kind).await else {
            state.phase = FailoverState::Exhausted;
            tracing::error!(group = %group_name, kind = %kind, "no failover available");
            self.host
                .notify_user(
                    &format!("No failover available in group '{group_name}' after {kind} error"),
                    Severity::Error,
                )
                .await;
            state.phase = FailoverState::Idle;
            return FailoverOutcome::Exhausted;
        };

        state.phase = FailoverState::Retrying;
        drop(guard);

        let host = Arc::clone(&self.host);
        let retry = self
            .retry
            .attempt(move |content| async move {
                host.resend_last_message(&content, DeliveryMode::FollowUp)
                    .await
            })
            .await;

        let mut state = self.state.lock().await;
        if state.phase == FailoverState::Retrying {
            state.phase = FailoverState::Idle;
        }
        match rotation {
            Rotation::Credential {
                provider,
                credential,
            } => FailoverOutcome::CredentialRotated {
                provider,
                credential,
                retry,
            },
            Rotation::Endpoint { candidate } => FailoverOutcome::EndpointRotated {
                endpoint: candidate.endpoint.id(),
                model: candidate.model,
                retry,
            },
        }
    }

    async fn rotate(
        &self,
        state: &mut EngineState,
        group: &Group,
        current: Option<&ModelDescriptor>,
        kind: FailureKind,
    ) -> Option<Rotation> {
        let default = state.config.default_cooldown();
        let position = current_position(group, current);
        let cooldown = position.map_or(default, |i| group.entries[i].cooldown(default));

        if let Some(current) = current {
            let endpoint_scoped = kind == FailureKind::Capacity
                && state.config.capacity_cooldown_scope == CooldownScope::Endpoint;
            if !endpoint_scoped
                && let Some(rotation) = self
                    .rotate_credential(state, &current.provider, cooldown)
                    .await
            {
                return Some(rotation);
            }
            if let Some(key) = position.and_then(|i| group.entries[i].endpoint().ok()) {
                state.registry.mark_exhausted(&key.id(), cooldown);
            }
        }

        self.rotate_endpoint(state, group, current).await
    }

    async fn rotate_credential(
        &self,
        state: &mut EngineState,
        provider: &ProviderId,
        cooldown: Duration,
    ) -> Option<Rotation> {
        let count = state.config.credentials.names(provider).len();
        let active = state.active_credential(provider)?;
        state
            .registry
            .mark_exhausted(&provider.credential_key(&active), cooldown);
        state.phase = FailoverState::CredentialRotating;

        // Each failed candidate is marked, so one pass per credential at most.
        for _ in 0..count {
            let next = next_credential(
                provider,
                &state.config.credentials,
                &active,
                &mut state.registry,
            )?;
            let blob = state.config.credentials.get(provider, &next)?.clone();
            match self.credential_store.save_active(provider, &blob).await {
                Ok(()) => {
                    tracing::info!(provider = %provider, from = %active, to = %next, "credential rotated");
                    state
                        .active_credentials
                        .insert(provider.clone(), next.clone());
                    self.host
                        .notify_user(
                            &format!("{provider}: switched to credential '{next}'"),
                            Severity::Info,
                        )
                        .await;
                    return Some(Rotation::Credential {
                        provider: provider.clone(),
                        credential: next,
                    });
                }
                Err(e) => {
                    tracing::warn!(provider = %provider, credential = %next, error = %e, "credential activation failed");
                    state
                        .registry
                        .mark_exhausted(&provider.credential_key(&next), cooldown);
                }
            }
        }
        None
    }

    async fn rotate_endpoint(
        &self,
        state: &mut EngineState,
        group: &Group,
        current: Option<&ModelDescriptor>,
    ) -> Option<Rotation> {
        state.phase = FailoverState::EndpointRotating;
        let mut scan = EndpointScan::new(group, current);
        while let Some(candidate) = scan.next_candidate(&mut state.registry, &*self.host).await {
            if self.activate_endpoint(state, &candidate).await {
                return Some(Rotation::Endpoint { candidate });
            }
        }
        None
    }

    /// Activate the candidate's preferred credential, then ask the host to
    /// switch. `false` when the host declines or fails.
    async fn activate_endpoint(&self, state: &mut EngineState, candidate: &Candidate) -> bool {
        let provider = &candidate.model.provider;
        let preferred = state.config.credentials.preferred(provider).and_then(|name| {
            let blob = state.config.credentials.get(provider, name)?;
            Some((name.to_string(), blob.clone()))
        });
        if let Some((name, blob)) = preferred {
            if let Err(e) = self.credential_store.save_active(provider, &blob).await {
                tracing::warn!(provider = %provider, credential = %name, error = %e, "failed to store credential");
            }
            state.active_credentials.insert(provider.clone(), name);
        }

        match self.host.switch_active_model(&candidate.model).await {
            Ok(true) => {
                tracing::info!(entry = %candidate.endpoint, model = %candidate.model.endpoint_id(), "endpoint rotated");
                self.host
                    .notify_user(
                        &format!("Switched to {}", candidate.model.endpoint_id()),
                        Severity::Info,
                    )
                    .await;
                true
            }
            Ok(false) => {
                tracing::info!(model = %candidate.model.endpoint_id(), "host declined model switch");
                false
            }
            Err(e) => {
                tracing::warn!(model = %candidate.model.endpoint_id(), error = %e, "model switch failed");
                false
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Make `name` the active group, clear every cooldown and persist it as
    /// the default group.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::UnknownGroup`] if no such group exists. A
    /// failure to persist is only logged.
    pub async fn switch_group(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.config.group(name).is_none() {
            return Err(RotakeyError::UnknownGroup(name.to_string()));
        }
        state.active_group = Some(name.to_string());
        state.registry.clear_all();
        state.config.default_group = Some(name.to_string());
        if let Err(e) = self.config_store.save_config(&state.config).await {
            tracing::warn!(group = name, error = %e, "failed to persist active group");
        }
        tracing::info!(group = name, "switched active group");
        Ok(())
    }

    /// Make a named credential the provider's active one.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::UnknownCredential`] if the name is not stored,
    /// or the credential store's error if the write fails.
    pub async fn switch_credential(&self, provider: &ProviderId, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let blob = state
            .config
            .credentials
            .get(provider, name)
            .ok_or_else(|| RotakeyError::UnknownCredential {
                provider: provider.to_string(),
                name: name.to_string(),
            })?
            .clone();
        self.credential_store.save_active(provider, &blob).await?;
        state
            .active_credentials
            .insert(provider.clone(), name.to_string());
        state.registry.clear(&provider.credential_key(name));
        tracing::info!(provider = %provider, credential = name, "switched credential");
        Ok(())
    }

    /// Reconcile the active selection with what the credential store holds.
    /// An active credential of a provider with no named credentials is
    /// imported as `"primary"` and the config is saved.
    pub async fn sync_credentials(&self) -> Vec<SyncReport> {
        self.reconcile_credentials(true).await
    }

    /// Like [`sync_credentials`](Self::sync_credentials) but never writes:
    /// only the in-memory active selection is updated.
    pub async fn match_active_credentials(&self) -> Vec<SyncReport> {
        self.reconcile_credentials(false).await
    }

    async fn reconcile_credentials(&self, import: bool) -> Vec<SyncReport> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut providers: Vec<ProviderId> = state.config.credentials.providers().cloned().collect();
        match self.credential_store.providers().await {
            Ok(stored) => {
                for p in stored {
                    if !providers.contains(&p) {
                        providers.push(p);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to list stored providers"),
        }

        let mut reports = Vec::with_capacity(providers.len());
        let mut imported = false;
        for provider in providers {
            let result = match self.credential_store.load_active(&provider).await {
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "failed to read active credential");
                    SyncResult::Failed(e.to_string())
                }
                Ok(None) => SyncResult::NoActive,
                Ok(Some(_)) if !import && !state.config.credentials.has_provider(&provider) => {
                    SyncResult::Unmatched
                }
                Ok(Some(blob)) if !state.config.credentials.has_provider(&provider) => {
                    state
                        .config
                        .credentials
                        .insert(provider.clone(), rotakey_types::PRIMARY_CREDENTIAL, blob);
                    state
                        .active_credentials
                        .insert(provider.clone(), rotakey_types::PRIMARY_CREDENTIAL.to_string());
                    imported = true;
                    SyncResult::Imported
                }
                Ok(Some(blob)) => match state
                    .config
                    .credentials
                    .find_matching(&provider, &blob)
                    .map(str::to_string)
                {
                    Some(name) => {
                        state.active_credentials.insert(provider.clone(), name.clone());
                        SyncResult::Matched(name)
                    }
                    None => SyncResult::Unmatched,
                },
            };
            tracing::debug!(provider = %provider, result = ?result, "synced credential");
            reports.push(SyncReport { provider, result });
        }

        if imported && let Err(e) = self.config_store.save_config(&state.config).await {
            tracing::warn!(error = %e, "failed to save imported credentials");
        }
        reports
    }

    /// Re-read the configuration from the store.
    ///
    /// When the store has nothing saved the current configuration stays.
    ///
    /// # Errors
    ///
    /// Returns the store's error; the last known configuration is kept.
    pub async fn reload_config(&self) -> Result<()> {
        let loaded = match self.config_store.load_config().await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(error = %e, "config reload failed, keeping last known config");
                return Err(e);
            }
        };
        let Some(config) = loaded else {
            tracing::debug!("no saved config, keeping current");
            return Ok(());
        };

        let mut state = self.state.lock().await;
        state.classifier = build_classifier(&config);
        self.retry.set_lock_duration(config.retry_lock());
        let group_survives = state
            .active_group
            .as_deref()
            .is_some_and(|g| config.group(g).is_some());
        if !group_survives {
            state.active_group.clone_from(&config.default_group);
        }
        tracing::info!(
            groups = config.groups.len(),
            active_group = state.active_group.as_deref().unwrap_or("-"),
            "config loaded"
        );
        state.config = config;
        Ok(())
    }

    /// Current group, state, cooldowns and active credentials.
    pub async fn status(&self) -> StatusReport {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let entries = state
            .active_group()
            .map(|(_, group)| {
                group
                    .entries
                    .iter()
                    .map(|entry| {
                        let key = entry.endpoint().map_or_else(|_| entry.id.clone(), |e| e.id());
                        EntryStatus {
                            cooldown_remaining_ms: state.registry.remaining(&key).map(millis),
                            id: entry.id.clone(),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let credentials = state
            .config
            .credentials
            .providers()
            .map(|provider| CredentialStatus {
                active: state.active_credential(provider),
                names: state
                    .config
                    .credentials
                    .names(provider)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                provider: provider.clone(),
            })
            .collect();

        let cooldowns = state
            .registry
            .snapshot()
            .into_iter()
            .map(|(key, left)| Cooldown {
                key,
                remaining_ms: millis(left),
            })
            .collect();

        StatusReport {
            active_group: state.active_group.clone(),
            state: state.phase,
            retrying: self.retry.is_retrying(),
            entries,
            credentials,
            cooldowns,
        }
    }
}
