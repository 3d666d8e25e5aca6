//! Settings persistence.

use async_trait::async_trait;
use browser_security::HostnameSettings;
use common::{GuardError, GuardResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Hostname-keyed settings storage.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored settings for a hostname, if any.
    async fn get(&self, hostname: &str) -> GuardResult<Option<HostnameSettings>>;

    /// Replace the settings for a hostname.
    async fn set(&self, hostname: &str, settings: HostnameSettings) -> GuardResult<()>;
}

/// Read settings for a hostname, treating "absent" and "unreadable" alike
/// as nothing disabled.
pub async fn settings_for(store: &dyn SettingsStore, hostname: &str) -> HostnameSettings {
    match store.get(hostname).await {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Reading settings for {} failed: {}", hostname, e);
            HostnameSettings::default()
        }
    }
}

/// In-memory settings store.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: RwLock<HashMap<String, HostnameSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with entries.
    pub fn with_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, HostnameSettings)>,
        S: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(h, s)| (h.into(), s)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, hostname: &str) -> GuardResult<Option<HostnameSettings>> {
        Ok(self.entries.read().get(hostname).copied())
    }

    async fn set(&self, hostname: &str, settings: HostnameSettings) -> GuardResult<()> {
        self.entries.write().insert(hostname.to_string(), settings);
        Ok(())
    }
}

/// Settings persisted as one JSON object keyed by hostname.
///
/// The whole map is rewritten on every `set`; writes go to a sibling temp
/// file first and are renamed into place.
#[derive(Debug)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, HostnameSettings>>,
}

impl JsonFileSettingsStore {
    /// Open a store, loading the file if it exists.
    pub async fn open(path: impl AsRef<Path>) -> GuardResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Loaded {} site settings from {}", entries.len(), path.display());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, HostnameSettings>) -> GuardResult<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                tracing::debug!("Removing {} failed: {}", tmp.display(), cleanup);
            }
            return Err(GuardError::storage(format!("{}: {}", self.path.display(), e)));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettingsStore {
    async fn get(&self, hostname: &str) -> GuardResult<Option<HostnameSettings>> {
        Ok(self.entries.lock().await.get(hostname).copied())
    }

    async fn set(&self, hostname: &str, settings: HostnameSettings) -> GuardResult<()> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(hostname.to_string(), settings);

        if let Err(e) = self.persist(&entries).await {
            // Keep memory and disk in agreement.
            match previous {
                Some(previous) => entries.insert(hostname.to_string(), previous),
                None => entries.remove(hostname),
            };
            return Err(e);
        }
        Ok(())
    }
}
