use crate::models::{DEFAULT_BASELINE_PER_DAY, QuitState};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use thiserror::Error;
use tokio::{fs, sync::Mutex};
use tracing::{debug, error, info, warn};

pub const STATE_KEY: &str = "smokefree_quit_state";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage payload is not valid JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String key-value persistence, the only capability the tracker needs from
/// its host.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn is_durable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    File,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" | "preferences" => Ok(StoreKind::File),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!("unknown store kind '{other}'")),
        }
    }
}

pub fn open_store(kind: StoreKind, path: &Path) -> Arc<dyn KeyValueStore> {
    match kind {
        StoreKind::File => Arc::new(FileStore::new(path.to_path_buf())),
        StoreKind::Memory => {
            warn!("using in-memory store, state will not survive a restart");
            Arc::new(MemoryStore::default())
        }
    }
}

/// Preferences file: one JSON object mapping keys to string values.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let payload = serde_json::to_vec_pretty(entries)?;
        fs::write(&self.path, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value);
        self.write_all(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        if entries.remove(key).is_some() {
            self.write_all(&entries).await?;
        }
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Loads the saved state, or a first-run default when nothing usable is stored.
pub async fn load_state(store: &dyn KeyValueStore) -> QuitState {
    let raw = match store.get(STATE_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            info!("no saved state found, starting first run");
            return QuitState::default();
        }
        Err(err) => {
            error!("failed to read saved state: {err}");
            return QuitState::default();
        }
    };

    match serde_json::from_str::<QuitState>(&raw) {
        Ok(mut state) => {
            if !(state.baseline_per_day > 0.0) {
                state.baseline_per_day = if state.daily_limit > 0.0 {
                    state.daily_limit
                } else {
                    DEFAULT_BASELINE_PER_DAY
                };
            }
            debug!(entries = state.cigarette_log.len(), "state loaded");
            state
        }
        Err(err) => {
            error!("failed to parse saved state: {err}");
            QuitState::default()
        }
    }
}

pub async fn persist_state(
    store: &dyn KeyValueStore,
    state: &QuitState,
) -> Result<(), StorageError> {
    let payload = serde_json::to_string(state)?;
    store.set(STATE_KEY, payload).await
}

/// Writes the state and logs a failure instead of returning it; the tracker
/// keeps running on its in-memory copy.
pub async fn save_state(store: &dyn KeyValueStore, state: &QuitState) {
    if let Err(err) = persist_state(store, state).await {
        error!("failed to persist state: {err}");
    }
}

pub async fn clear_state(store: &dyn KeyValueStore) {
    if let Err(err) = store.remove(STATE_KEY).await {
        error!("failed to clear saved state: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn sample_state() -> QuitState {
        QuitState {
            cigarette_log: vec![
                DateTime::parse_from_rfc3339("2024-01-01T10:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ],
            daily_limit: 7.0,
            first_run: false,
            ..QuitState::default()
        }
    }

    #[tokio::test]
    async fn file_store_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("prefs.json"));

        persist_state(&store, &sample_state()).await.unwrap();
        let loaded = load_state(&store).await;
        assert_eq!(loaded, sample_state());

        let reopened = FileStore::new(store.path().to_path_buf());
        assert_eq!(load_state(&reopened).await, sample_state());
    }

    #[tokio::test]
    async fn file_store_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("prefs.json"));
        store.set("theme", "dark".to_string()).await.unwrap();
        persist_state(&store, &sample_state()).await.unwrap();
        clear_state(&store).await;

        assert_eq!(store.get("theme").await.unwrap().as_deref(), Some("dark"));
        assert_eq!(store.get(STATE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_payload_loads_defaults() {
        let store = MemoryStore::default();
        store.set(STATE_KEY, "{not json".to_string()).await.unwrap();
        assert_eq!(load_state(&store).await, QuitState::default());
    }

    #[tokio::test]
    async fn missing_baseline_falls_back_to_daily_limit() {
        let store = MemoryStore::default();
        store
            .set(STATE_KEY, r#"{"dailyLimit": 12, "baselinePerDay": 0}"#.to_string())
            .await
            .unwrap();
        let state = load_state(&store).await;
        assert_eq!(state.baseline_per_day, 12.0);
    }

    #[tokio::test]
    async fn unreadable_file_degrades_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be
        let store = FileStore::new(dir.path().to_path_buf());
        assert_eq!(load_state(&store).await, QuitState::default());
        save_state(&store, &sample_state()).await;
    }

    #[test]
    fn store_kind_parses_names() {
        assert_eq!("file".parse::<StoreKind>(), Ok(StoreKind::File));
        assert_eq!(" Memory ".parse::<StoreKind>(), Ok(StoreKind::Memory));
        assert!("cloud".parse::<StoreKind>().is_err());
    }
}
