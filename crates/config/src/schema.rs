use indexmap::IndexMap;
use rotakey_types::{CredentialSet, EndpointRef, RotakeyError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_cooldown_ms() -> u64 {
    60_000
}
fn default_retry_lock_ms() -> u64 {
    5_000
}

/// One entry of a failover group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointEntry {
    /// `"provider"` or `"provider/model"`.
    pub id: String,
    /// Per-entry cooldown override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_ms: Option<u64>,
}

impl EndpointEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cooldown_ms: None,
        }
    }

    #[must_use]
    pub fn with_cooldown_ms(mut self, ms: u64) -> Self {
        self.cooldown_ms = Some(ms);
        self
    }

    /// Parse the entry id.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::InvalidEndpoint`] for a malformed id.
    pub fn endpoint(&self) -> rotakey_types::Result<EndpointRef> {
        EndpointRef::parse(&self.id)
    }

    /// The entry's cooldown, falling back to `default`.
    #[must_use]
    pub fn cooldown(&self, default: Duration) -> Duration {
        self.cooldown_ms.map_or(default, Duration::from_millis)
    }
}

/// An ordered priority list of endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub entries: Vec<EndpointEntry>,
}

impl Group {
    pub fn new(entries: impl IntoIterator<Item = EndpointEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

/// Which key a capacity failure puts into cooldown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// Cool down the active credential and try the provider's other
    /// credentials first, exactly like a quota failure.
    #[default]
    Credential,
    /// Cool down the whole endpoint and move straight to the next group entry.
    Endpoint,
}

/// Category assigned by a configured classifier rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Quota,
    Capacity,
}

/// An extra classifier rule appended to the built-in table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Case-insensitive regular expression matched against the error text.
    pub pattern: String,
    pub category: RuleCategory,
    /// Only apply to providers in this family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Apply to every provider except this family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub except_provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Scalar settings that may be overridden from the environment.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    default_group: Option<String>,
    default_cooldown_ms: Option<u64>,
    retry_lock_ms: Option<u64>,
    capacity_cooldown_scope: Option<CooldownScope>,
}

impl EnvOverrides {
    fn from_figment(figment: figment::Figment) -> rotakey_types::Result<Self> {
        figment
            .extract()
            .map_err(|e| RotakeyError::Config(format!("environment: {e}")))
    }

    fn apply(self, config: &mut Config) {
        if let Some(group) = self.default_group {
            config.default_group = Some(group);
        }
        if let Some(ms) = self.default_cooldown_ms {
            config.default_cooldown_ms = ms;
        }
        if let Some(ms) = self.retry_lock_ms {
            config.retry_lock_ms = ms;
        }
        if let Some(scope) = self.capacity_cooldown_scope {
            config.capacity_cooldown_scope = scope;
        }
    }
}

/// Top-level durable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Group activated at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_group: Option<String>,
    /// Cooldown applied when an entry has no override (defaults to 60 s).
    #[serde(default = "default_cooldown_ms")]
    pub default_cooldown_ms: u64,
    /// How long a retry holds the in-flight lock (defaults to 5 s).
    #[serde(default = "default_retry_lock_ms")]
    pub retry_lock_ms: u64,
    #[serde(default)]
    pub capacity_cooldown_scope: CooldownScope,
    /// Named failover groups, in insertion order.
    #[serde(default)]
    pub groups: IndexMap<String, Group>,
    /// Named credentials per provider.
    #[serde(default)]
    pub credentials: CredentialSet,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_group: None,
            default_cooldown_ms: default_cooldown_ms(),
            retry_lock_ms: default_retry_lock_ms(),
            capacity_cooldown_scope: CooldownScope::default(),
            groups: IndexMap::new(),
            credentials: CredentialSet::new(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn default_cooldown(&self) -> Duration {
        Duration::from_millis(self.default_cooldown_ms)
    }

    #[must_use]
    pub fn retry_lock(&self) -> Duration {
        Duration::from_millis(self.retry_lock_ms)
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Parses configuration from a JSON string; missing fields take defaults.
    ///
    /// Parsed with `serde_json` directly so that group and credential order
    /// survives loading.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::Config`] if the JSON is invalid.
    pub fn from_json(json: &str) -> rotakey_types::Result<Self> {
        serde_json::from_str(json).map_err(|e| RotakeyError::Config(e.to_string()))
    }

    /// Loads configuration from a file path, then applies `ROTAKEY_*`
    /// environment overrides for the scalar settings.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::Storage`] if the file cannot be read and
    /// [`RotakeyError::Config`] if it or the environment cannot be parsed.
    pub fn from_file(path: &std::path::Path) -> rotakey_types::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RotakeyError::Storage(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_json(&raw)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Merges `ROTAKEY_DEFAULT_GROUP`, `ROTAKEY_DEFAULT_COOLDOWN_MS`,
    /// `ROTAKEY_RETRY_LOCK_MS` and `ROTAKEY_CAPACITY_COOLDOWN_SCOPE`.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::Config`] if a variable holds an invalid value.
    pub fn apply_env_overrides(&mut self) -> rotakey_types::Result<()> {
        let overrides = EnvOverrides::from_figment(
            figment::Figment::from(figment::providers::Env::prefixed("ROTAKEY_")),
        )?;
        overrides.apply(self);
        Ok(())
    }

    /// Checks cross-field invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::Config`] describing the first problem found.
    pub fn validate(&self) -> rotakey_types::Result<()> {
        if let Some(name) = &self.default_group
            && !self.groups.contains_key(name)
        {
            return Err(RotakeyError::Config(format!(
                "default_group {name:?} is not a configured group"
            )));
        }
        for (name, group) in &self.groups {
            for entry in &group.entries {
                entry.endpoint().map_err(|e| {
                    RotakeyError::Config(format!("group {name:?}: {e}"))
                })?;
            }
        }
        for rule in &self.classifier.rules {
            if rule.provider.is_some() && rule.except_provider.is_some() {
                return Err(RotakeyError::Config(format!(
                    "classifier rule {:?} sets both provider and except_provider",
                    rule.pattern
                )));
            }
        }
        Ok(())
    }
}
