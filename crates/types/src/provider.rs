//! Provider identifiers and endpoint references.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an upstream model provider (e.g. `"anthropic"`, `"google-gemini-cli"`).
///
/// Provider ids are free-form: the set of providers is whatever the host
/// enumerates, so this is a thin string wrapper rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id names a member of the given provider family.
    ///
    /// Family membership is a case-insensitive substring match on the id, so
    /// `"google-gemini-cli"` and `"gemini"` both belong to family `"gemini"`.
    #[must_use]
    pub fn in_family(&self, family: &str) -> bool {
        self.0.to_lowercase().contains(&family.to_lowercase())
    }

    /// Exhaustion key for one of this provider's named credentials.
    #[must_use]
    pub fn credential_key(&self, credential: &str) -> String {
        format!("{}:{credential}", self.0)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A parsed endpoint entry id: `"provider"` or `"provider/model"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointRef {
    pub provider: ProviderId,
    /// `None` means "any model from this provider".
    pub model: Option<String>,
}

impl EndpointRef {
    /// Parse an entry id, splitting at the first `/`.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::InvalidEndpoint`](crate::RotakeyError::InvalidEndpoint)
    /// if the provider segment is empty or the model segment is present but empty.
    pub fn parse(id: &str) -> crate::Result<Self> {
        let id = id.trim();
        let (provider, model) = match id.split_once('/') {
            Some((p, m)) => (p, Some(m)),
            None => (id, None),
        };
        if provider.is_empty() || model.is_some_and(str::is_empty) {
            return Err(crate::RotakeyError::InvalidEndpoint(id.to_string()));
        }
        Ok(Self {
            provider: ProviderId::new(provider),
            model: model.map(str::to_string),
        })
    }

    /// The canonical id, also used as this endpoint's exhaustion key.
    #[must_use]
    pub fn id(&self) -> String {
        match &self.model {
            Some(m) => format!("{}/{m}", self.provider),
            None => self.provider.to_string(),
        }
    }
}

impl fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl std::str::FromStr for EndpointRef {
    type Err = crate::RotakeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
