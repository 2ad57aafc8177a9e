//! In-memory stores backed by a `HashMap` behind a `Mutex`.

use async_trait::async_trait;
use rotakey_config::{Config, ConfigStore};
use rotakey_types::{Credential, CredentialStore, ProviderId, Result, RotakeyError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory [`CredentialStore`] for testing and embedding.
pub struct InMemoryCredentialStore {
    /// Provider-keyed active credential map.
    data: Mutex<HashMap<ProviderId, Credential>>,
    /// When set, every write fails with a storage error.
    fail_writes: AtomicBool,
}

impl InMemoryCredentialStore {
    /// Creates a new empty in-memory credential store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RotakeyError::Storage("credential store is read-only".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load_active(&self, provider: &ProviderId) -> Result<Option<Credential>> {
        Ok(self.data.lock().unwrap().get(provider).cloned())
    }

    async fn save_active(&self, provider: &ProviderId, credential: &Credential) -> Result<()> {
        self.check_writable()?;
        self.data
            .lock()
            .unwrap()
            .insert(provider.clone(), credential.clone());
        Ok(())
    }

    async fn providers(&self) -> Result<Vec<ProviderId>> {
        let mut providers: Vec<ProviderId> = self.data.lock().unwrap().keys().cloned().collect();
        providers.sort();
        Ok(providers)
    }
}

/// An in-memory [`ConfigStore`] holding at most one [`Config`].
pub struct InMemoryConfigStore {
    data: Mutex<Option<Config>>,
    fail_writes: AtomicBool,
}

impl InMemoryConfigStore {
    #[must_use]
    pub fn new(config: Option<Config>) -> Self {
        Self {
            data: Mutex::new(config),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The last saved configuration.
    #[must_use]
    pub fn snapshot(&self) -> Option<Config> {
        self.data.lock().unwrap().clone()
    }
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load_config(&self) -> Result<Option<Config>> {
        Ok(self.data.lock().unwrap().clone())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RotakeyError::Storage("config store is read-only".into()));
        }
        *self.data.lock().unwrap() = Some(config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryCredentialStore::new();
        let p: ProviderId = "anthropic".into();
        store.save_active(&p, &Credential::api_key("k1")).await.unwrap();
        let loaded = store.load_active(&p).await.unwrap().unwrap();
        assert_eq!(loaded, Credential::api_key("k1"));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = InMemoryCredentialStore::new();
        assert!(store.load_active(&"gemini".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_providers_sorted() {
        let store = InMemoryCredentialStore::new();
        store.save_active(&"b".into(), &Credential::api_key("1")).await.unwrap();
        store.save_active(&"a".into(), &Credential::api_key("2")).await.unwrap();
        assert_eq!(
            store.providers().await.unwrap(),
            vec![ProviderId::from("a"), ProviderId::from("b")]
        );
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = InMemoryCredentialStore::new();
        store.set_fail_writes(true);
        let err = store
            .save_active(&"p".into(), &Credential::api_key("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, RotakeyError::Storage(_)));
        store.set_fail_writes(false);
        store.save_active(&"p".into(), &Credential::api_key("k")).await.unwrap();
    }

    #[tokio::test]
    async fn test_config_store_roundtrip() {
        let store = InMemoryConfigStore::default();
        assert!(store.load_config().await.unwrap().is_none());
        let config = Config {
            default_cooldown_ms: 10,
            ..Config::default()
        };
        store.save_config(&config).await.unwrap();
        assert_eq!(store.load_config().await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn test_config_store_fail_writes_keeps_previous() {
        let store = InMemoryConfigStore::new(Some(Config::default()));
        store.set_fail_writes(true);
        let changed = Config {
            retry_lock_ms: 1,
            ..Config::default()
        };
        assert!(store.save_config(&changed).await.is_err());
        assert_eq!(store.snapshot(), Some(Config::default()));
    }
}
