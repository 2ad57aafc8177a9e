//! JSON file backed stores.
//!
//! Both files are rewritten whole on every save: the new content goes to a
//! uniquely named temp file in the same directory which is then persisted
//! over the original, so a crash mid-write never leaves a truncated document
//! behind and concurrent writers never share a temp file.

use async_trait::async_trait;
use indexmap::IndexMap;
use rotakey_config::{Config, ConfigStore};
use rotakey_types::{Credential, CredentialStore, ProviderId, Result, RotakeyError};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

/// Write `bytes` to `path` through a [`NamedTempFile`] + persist.
///
/// The temp file is created with mode 0600 on unix and keeps it after the
/// rename.
async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &bytes))
        .await
        .map_err(|e| RotakeyError::Storage(format!("write task failed: {e}")))?
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| RotakeyError::Storage(format!("{}: {}", path.display(), e.error)))?;
    Ok(())
}

/// Read a file, mapping "not found" to `None`.
async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RotakeyError::Storage(format!("{}: {e}", path.display()))),
    }
}

// ── Credential store ─────────────────────────────────────────────────────────

/// A [`CredentialStore`] over a JSON object mapping provider id → blob.
///
/// This is the file the host reads to authenticate. Entries for providers the
/// engine never touches are preserved on every write.
pub struct JsonFileCredentialStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<IndexMap<ProviderId, Credential>> {
        match read_optional(&self.path).await? {
            None => Ok(IndexMap::new()),
            Some(raw) if raw.trim().is_empty() => Ok(IndexMap::new()),
            Some(raw) => Ok(serde_json::from_str(&raw)?),
        }
    }

    async fn write_all(&self, all: &IndexMap<ProviderId, Credential>) -> Result<()> {
        let json = serde_json::to_vec_pretty(all)?;
        write_atomic(&self.path, json).await
    }
}

#[async_trait]
impl CredentialStore for JsonFileCredentialStore {
    async fn load_active(&self, provider: &ProviderId) -> Result<Option<Credential>> {
        Ok(self.read_all().await?.shift_remove(provider))
    }

    async fn save_active(&self, provider: &ProviderId, credential: &Credential) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.read_all().await?;
        all.insert(provider.clone(), credential.clone());
        self.write_all(&all).await?;
        tracing::debug!(provider = %provider, path = %self.path.display(), "active credential written");
        Ok(())
    }

    async fn providers(&self) -> Result<Vec<ProviderId>> {
        Ok(self.read_all().await?.into_keys().collect())
    }
}

// ── Config store ─────────────────────────────────────────────────────────────

/// A [`ConfigStore`] over a pretty-printed JSON file.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load_config(&self) -> Result<Option<Config>> {
        let Some(raw) = read_optional(&self.path).await? else {
            return Ok(None);
        };
        let mut config = Config::from_json(&raw)?;
        config.apply_env_overrides()?;
        Ok(Some(config))
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        let mut json = serde_json::to_vec_pretty(config)?;
        json.push(b'\n');
        write_atomic(&self.path, json).await?;
        tracing::debug!(path = %self.path.display(), "config saved");
        Ok(())
    }
}
