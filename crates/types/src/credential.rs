//! Credential blobs and the named credential set.

use crate::ProviderId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Conventional name of the first-preferred credential of a provider.
pub const PRIMARY_CREDENTIAL: &str = "primary";

/// An opaque authentication blob.
///
/// The engine never looks inside; every field, including the optional
/// `"type"` tag, is preserved verbatim when the blob is copied between stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(Map<String, Value>);

impl Credential {
    /// Wrap a JSON object.
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// A statically supplied API key blob (`{"type": "api_key", "key": ...}`).
    pub fn api_key(key: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("type".into(), Value::String("api_key".into()));
        fields.insert("key".into(), Value::String(key.into()));
        Self(fields)
    }
}

/// Provider → (credential name → blob), insertion-ordered at both levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet(IndexMap<ProviderId, IndexMap<String, Credential>>);

impl CredentialSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credential names of a provider, in rotation order.
    #[must_use]
    pub fn names(&self, provider: &ProviderId) -> Vec<&str> {
        self.0
            .get(provider)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, provider: &ProviderId, name: &str) -> Option<&Credential> {
        self.0.get(provider).and_then(|m| m.get(name))
    }

    /// Whether the provider has at least one stored credential.
    #[must_use]
    pub fn has_provider(&self, provider: &ProviderId) -> bool {
        self.0.get(provider).is_some_and(|m| !m.is_empty())
    }

    /// Insert or replace a credential. New names are appended to the order.
    pub fn insert(&mut self, provider: ProviderId, name: impl Into<String>, credential: Credential) {
        self.0
            .entry(provider)
            .or_default()
            .insert(name.into(), credential);
    }

    /// Providers that have stored credentials, in insertion order.
    pub fn providers(&self) -> impl Iterator<Item = &ProviderId> {
        self.0.iter().filter(|(_, m)| !m.is_empty()).map(|(p, _)| p)
    }

    /// The credential to prefer for a provider: `"primary"` if stored,
    /// otherwise the first one in insertion order.
    #[must_use]
    pub fn preferred(&self, provider: &ProviderId) -> Option<&str> {
        let creds = self.0.get(provider)?;
        if creds.contains_key(PRIMARY_CREDENTIAL) {
            return Some(PRIMARY_CREDENTIAL);
        }
        creds.keys().next().map(String::as_str)
    }

    /// Find the name under which an identical blob is stored.
    #[must_use]
    pub fn find_matching(&self, provider: &ProviderId, credential: &Credential) -> Option<&str> {
        self.0
            .get(provider)?
            .iter()
            .find(|(_, c)| *c == credential)
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn oauth(access: &str) -> Credential {
        serde_json::from_value(json!({"type": "oauth", "access": access, "expires": 1})).unwrap()
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let c = oauth("tok");
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "oauth");
        assert_eq!(v["access"], "tok");
        assert_eq!(v["expires"], 1);
    }

    #[test]
    fn test_names_keep_insertion_order() {
        let mut set = CredentialSet::new();
        let p = ProviderId::new("p1");
        set.insert(p.clone(), "primary", Credential::api_key("a"));
        set.insert(p.clone(), "zeta", Credential::api_key("b"));
        set.insert(p.clone(), "alpha", Credential::api_key("c"));
        assert_eq!(set.names(&p), vec!["primary", "zeta", "alpha"]);
    }

    #[test]
    fn test_deserialize_preserves_order() {
        let set: CredentialSet = serde_json::from_value(json!({
            "p1": {"backup-2": {"type": "api_key"}, "primary": {"type": "api_key"}}
        }))
        .unwrap();
        assert_eq!(set.names(&ProviderId::new("p1")), vec!["backup-2", "primary"]);
    }

    #[test]
    fn test_preferred_falls_back_to_first() {
        let mut set = CredentialSet::new();
        let p = ProviderId::new("p1");
        set.insert(p.clone(), "work", Credential::api_key("a"));
        set.insert(p.clone(), "home", Credential::api_key("b"));
        assert_eq!(set.preferred(&p), Some("work"));
        set.insert(p.clone(), PRIMARY_CREDENTIAL, Credential::api_key("c"));
        assert_eq!(set.preferred(&p), Some("primary"));
        assert_eq!(set.preferred(&ProviderId::new("none")), None);
    }

    #[test]
    fn test_find_matching() {
        let mut set = CredentialSet::new();
        let p = ProviderId::new("p1");
        set.insert(p.clone(), "primary", oauth("a"));
        set.insert(p.clone(), "backup-1", oauth("b"));
        assert_eq!(set.find_matching(&p, &oauth("b")), Some("backup-1"));
        assert_eq!(set.find_matching(&p, &oauth("zzz")), None);
    }
}
