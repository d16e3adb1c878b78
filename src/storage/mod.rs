//! Durable key-value storage and the typed repository over it.
//!
//! Storage is split into two scopes:
//! - **sync scope**: site configs, cooldown settings, whitelists, and
//!   learning mode (user data that survives restarts)
//! - **session scope**: active timers and blocked sites (blocked sites are
//!   durable across restarts; active timers are cleared on every daemon
//!   start because scheduled alarms do not reliably survive one)
//!
//! Every read degrades to a default value when the stored entry is missing or
//! malformed; storage problems never take down the coordinator.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::types::{
    default_site_configs, default_whitelist_channels, ActiveTimers, BlockedSites,
    CooldownSettings, LearningMode, SiteConfigs,
};

// ============================================================================
// Storage keys
// ============================================================================

/// Sync scope: site pattern -> minutes.
pub const SITE_CONFIGS_KEY: &str = "site_timers";
/// Sync scope: cooldown settings.
pub const COOLDOWN_SETTINGS_KEY: &str = "cooldown_settings";
/// Sync scope: whitelisted channel fragments.
pub const WHITELIST_CHANNELS_KEY: &str = "whitelist_channels";
/// Sync scope: whitelisted video URLs.
pub const WHITELIST_VIDEOS_KEY: &str = "whitelist_videos";
/// Sync scope: learning mode settings.
pub const LEARNING_MODE_KEY: &str = "learning_mode";
/// Session scope: active timers keyed by tab id.
pub const ACTIVE_TIMERS_KEY: &str = "active_timers";
/// Session scope: blocked sites keyed by pattern.
pub const BLOCKED_SITES_KEY: &str = "blocked_sites";

// ============================================================================
// StorageError
// ============================================================================

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem error while reading or writing the backing file.
    #[error("ストレージファイルの読み書きに失敗しました: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization of a value failed.
    #[error("値のシリアライズに失敗しました: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The user data directory could not be determined.
    #[error("ホームディレクトリが特定できません")]
    NoHomeDirectory,
}

impl StorageError {
    /// Returns true if this error is a filesystem error.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

// ============================================================================
// StorageArea
// ============================================================================

/// A single key-value storage scope.
///
/// Values are raw JSON; typed access lives in [`Repository`].
pub trait StorageArea: Send + Sync {
    /// Returns the stored value for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Removes the value stored under `key`, if any.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// MemoryStorage
// ============================================================================

/// In-memory storage area, used in tests and as a session-scope default.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage area.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("MemoryStorage: mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl StorageArea for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// JsonFileStorage
// ============================================================================

/// Storage area persisted as a single JSON object file.
///
/// The whole map is rewritten on every mutation; entry counts here are tiny.
/// A missing or unreadable file loads as empty rather than failing.
pub struct JsonFileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, Value>>,
}

impl JsonFileStorage {
    /// Opens (or initializes) the storage file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        "storage file {:?} is corrupted, starting empty: {}",
                        path,
                        e
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("JsonFileStorage: mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn persist(&self, entries: &HashMap<String, Value>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl StorageArea for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.lock();
        entries.remove(key);
        self.persist(&entries)
    }
}

// ============================================================================
// Repository
// ============================================================================

/// Typed access to the two storage scopes.
///
/// Cheap to clone; both scopes are shared handles.
#[derive(Clone)]
pub struct Repository {
    sync: Arc<dyn StorageArea>,
    session: Arc<dyn StorageArea>,
}

impl Repository {
    /// Creates a repository over the given scopes.
    pub fn new(sync: Arc<dyn StorageArea>, session: Arc<dyn StorageArea>) -> Self {
        Self { sync, session }
    }

    /// Creates a fully in-memory repository (tests, dry runs).
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
        )
    }

    /// Opens the file-backed repository under the user data directory.
    pub fn open_default() -> Result<Self, StorageError> {
        let dir = data_dir()?;
        Ok(Self::new(
            Arc::new(JsonFileStorage::open(dir.join("sync.json"))?),
            Arc::new(JsonFileStorage::open(dir.join("session.json"))?),
        ))
    }

    // ── Sync scope ───────────────────────────────────────────────────

    pub fn site_configs(&self) -> SiteConfigs {
        read_or_default(self.sync.as_ref(), SITE_CONFIGS_KEY)
    }

    pub fn set_site_configs(&self, configs: &SiteConfigs) -> Result<(), StorageError> {
        write(self.sync.as_ref(), SITE_CONFIGS_KEY, configs)
    }

    pub fn cooldown_settings(&self) -> CooldownSettings {
        read_or_default(self.sync.as_ref(), COOLDOWN_SETTINGS_KEY)
    }

    pub fn set_cooldown_settings(&self, settings: &CooldownSettings) -> Result<(), StorageError> {
        write(self.sync.as_ref(), COOLDOWN_SETTINGS_KEY, settings)
    }

    pub fn whitelist_channels(&self) -> Vec<String> {
        read_or_default(self.sync.as_ref(), WHITELIST_CHANNELS_KEY)
    }

    pub fn set_whitelist_channels(&self, channels: &[String]) -> Result<(), StorageError> {
        write(self.sync.as_ref(), WHITELIST_CHANNELS_KEY, &channels)
    }

    pub fn whitelist_videos(&self) -> Vec<String> {
        read_or_default(self.sync.as_ref(), WHITELIST_VIDEOS_KEY)
    }

    pub fn set_whitelist_videos(&self, videos: &[String]) -> Result<(), StorageError> {
        write(self.sync.as_ref(), WHITELIST_VIDEOS_KEY, &videos)
    }

    pub fn learning_mode(&self) -> LearningMode {
        read_or_default(self.sync.as_ref(), LEARNING_MODE_KEY)
    }

    pub fn set_learning_mode(&self, settings: &LearningMode) -> Result<(), StorageError> {
        write(self.sync.as_ref(), LEARNING_MODE_KEY, settings)
    }

    // ── Session scope ────────────────────────────────────────────────

    pub fn active_timers(&self) -> ActiveTimers {
        read_or_default(self.session.as_ref(), ACTIVE_TIMERS_KEY)
    }

    pub fn set_active_timers(&self, timers: &ActiveTimers) -> Result<(), StorageError> {
        write(self.session.as_ref(), ACTIVE_TIMERS_KEY, timers)
    }

    pub fn blocked_sites(&self) -> BlockedSites {
        read_or_default(self.session.as_ref(), BLOCKED_SITES_KEY)
    }

    pub fn set_blocked_sites(&self, blocked: &BlockedSites) -> Result<(), StorageError> {
        write(self.session.as_ref(), BLOCKED_SITES_KEY, blocked)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Prepares storage for a daemon run.
    ///
    /// On the first-ever run (no site configs stored yet) this performs the
    /// install step: built-in defaults are merged under any existing user
    /// values and both session records are cleared. Every run then clears
    /// active timers, since scheduled alarms do not survive the process.
    /// Blocked sites are left alone so a running cooldown cannot be escaped
    /// by restarting.
    pub fn initialize(&self) -> Result<(), StorageError> {
        let first_run = self.sync.get(SITE_CONFIGS_KEY)?.is_none();
        if first_run {
            self.install()?;
        }
        self.set_active_timers(&ActiveTimers::new())?;
        Ok(())
    }

    /// Install step: seeds defaults without overwriting user edits and
    /// resets session records.
    pub fn install(&self) -> Result<(), StorageError> {
        let mut sites = default_site_configs();
        for (site, minutes) in self.site_configs() {
            sites.insert(site, minutes);
        }
        self.set_site_configs(&sites)?;

        if self.sync.get(COOLDOWN_SETTINGS_KEY)?.is_none() {
            self.set_cooldown_settings(&CooldownSettings::default())?;
        }

        let mut channels = self.whitelist_channels();
        for default in default_whitelist_channels() {
            if !channels.contains(&default) {
                channels.push(default);
            }
        }
        self.set_whitelist_channels(&channels)?;

        self.set_active_timers(&ActiveTimers::new())?;
        self.set_blocked_sites(&BlockedSites::new())?;
        Ok(())
    }
}

/// Reads a typed value, degrading to its default on a missing or malformed
/// entry.
fn read_or_default<T: DeserializeOwned + Default>(area: &dyn StorageArea, key: &str) -> T {
    match area.get(key) {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!("stored entry '{}' is malformed, using default: {}", key, e);
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!("reading '{}' failed, using default: {}", key, e);
            T::default()
        }
    }
}

/// Serializes and stores a typed value.
fn write<T: Serialize + ?Sized>(
    area: &dyn StorageArea,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    area.set(key, serde_json::to_value(value)?)
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns the user data directory (`~/.sitelimit`).
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let home = dirs::home_dir().ok_or(StorageError::NoHomeDirectory)?;
    Ok(home.join(".sitelimit"))
}

/// Removes duplicate entries while preserving first-seen order.
pub fn dedup_preserving_order(entries: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // MemoryStorage Tests
    // ------------------------------------------------------------------------

    mod memory_storage_tests {
        use super::*;

        #[test]
        fn test_get_missing_key() {
            let storage = MemoryStorage::new();
            assert!(storage.get("nothing").unwrap().is_none());
        }

        #[test]
        fn test_set_and_get() {
            let storage = MemoryStorage::new();
            storage.set("key", serde_json::json!({"a": 1})).unwrap();
            assert_eq!(
                storage.get("key").unwrap(),
                Some(serde_json::json!({"a": 1}))
            );
        }

        #[test]
        fn test_set_overwrites() {
            let storage = MemoryStorage::new();
            storage.set("key", serde_json::json!(1)).unwrap();
            storage.set("key", serde_json::json!(2)).unwrap();
            assert_eq!(storage.get("key").unwrap(), Some(serde_json::json!(2)));
        }

        #[test]
        fn test_remove() {
            let storage = MemoryStorage::new();
            storage.set("key", serde_json::json!(1)).unwrap();
            storage.remove("key").unwrap();
            assert!(storage.get("key").unwrap().is_none());
        }
    }

    // ------------------------------------------------------------------------
    // JsonFileStorage Tests
    // ------------------------------------------------------------------------

    mod json_file_storage_tests {
        use super::*;
        use tempfile::tempdir;

        #[test]
        fn test_missing_file_starts_empty() {
            let dir = tempdir().unwrap();
            let storage = JsonFileStorage::open(dir.path().join("store.json")).unwrap();
            assert!(storage.get("key").unwrap().is_none());
        }

        #[test]
        fn test_values_survive_reopen() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("store.json");

            {
                let storage = JsonFileStorage::open(&path).unwrap();
                storage.set("key", serde_json::json!("value")).unwrap();
            }

            let storage = JsonFileStorage::open(&path).unwrap();
            assert_eq!(
                storage.get("key").unwrap(),
                Some(serde_json::json!("value"))
            );
        }

        #[test]
        fn test_corrupted_file_starts_empty() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("store.json");
            std::fs::write(&path, "{ not json").unwrap();

            let storage = JsonFileStorage::open(&path).unwrap();
            assert!(storage.get("key").unwrap().is_none());
        }

        #[test]
        fn test_creates_parent_directory() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("nested").join("store.json");
            let storage = JsonFileStorage::open(&path).unwrap();
            storage.set("key", serde_json::json!(true)).unwrap();
            assert!(path.exists());
        }

        #[test]
        fn test_remove_persists() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("store.json");

            {
                let storage = JsonFileStorage::open(&path).unwrap();
                storage.set("key", serde_json::json!(1)).unwrap();
                storage.remove("key").unwrap();
            }

            let storage = JsonFileStorage::open(&path).unwrap();
            assert!(storage.get("key").unwrap().is_none());
        }
    }

    // ------------------------------------------------------------------------
    // Repository Tests
    // ------------------------------------------------------------------------

    mod repository_tests {
        use super::*;
        use crate::types::{ActiveTimer, BlockedSite};

        #[test]
        fn test_defaults_when_empty() {
            let repo = Repository::in_memory();
            assert!(repo.site_configs().is_empty());
            assert_eq!(repo.cooldown_settings(), CooldownSettings::default());
            assert!(repo.whitelist_channels().is_empty());
            assert!(repo.whitelist_videos().is_empty());
            assert!(!repo.learning_mode().enabled);
            assert!(repo.active_timers().is_empty());
            assert!(repo.blocked_sites().is_empty());
        }

        #[test]
        fn test_typed_round_trips() {
            let repo = Repository::in_memory();

            let mut sites = SiteConfigs::new();
            sites.insert("reddit.com".to_string(), 10);
            repo.set_site_configs(&sites).unwrap();
            assert_eq!(repo.site_configs(), sites);

            let settings = CooldownSettings {
                enabled: false,
                duration_minutes: 90,
            };
            repo.set_cooldown_settings(&settings).unwrap();
            assert_eq!(repo.cooldown_settings(), settings);

            let mut timers = ActiveTimers::new();
            timers.insert(
                3,
                ActiveTimer {
                    site: "reddit.com".to_string(),
                    minutes: 10,
                    start_time: 1,
                    alarm_name: "close_tab_3".to_string(),
                },
            );
            repo.set_active_timers(&timers).unwrap();
            assert_eq!(repo.active_timers(), timers);
        }

        #[test]
        fn test_malformed_entry_reads_as_default() {
            let sync = Arc::new(MemoryStorage::new());
            sync.set(SITE_CONFIGS_KEY, serde_json::json!("definitely not a map"))
                .unwrap();
            let repo = Repository::new(sync, Arc::new(MemoryStorage::new()));
            assert!(repo.site_configs().is_empty());
        }

        #[test]
        fn test_install_seeds_defaults() {
            let repo = Repository::in_memory();
            repo.install().unwrap();

            assert_eq!(repo.site_configs(), default_site_configs());
            assert_eq!(repo.cooldown_settings(), CooldownSettings::default());
            assert_eq!(repo.whitelist_channels(), default_whitelist_channels());
        }

        #[test]
        fn test_install_preserves_user_edits() {
            let repo = Repository::in_memory();

            let mut sites = SiteConfigs::new();
            sites.insert("youtube.com".to_string(), 15); // user override
            sites.insert("news.example".to_string(), 3); // user addition
            repo.set_site_configs(&sites).unwrap();
            repo.set_cooldown_settings(&CooldownSettings {
                enabled: false,
                duration_minutes: 30,
            })
            .unwrap();

            repo.install().unwrap();

            let merged = repo.site_configs();
            assert_eq!(merged.get("youtube.com"), Some(&15));
            assert_eq!(merged.get("news.example"), Some(&3));
            assert_eq!(merged.get("reddit.com"), Some(&10)); // default appeared
            assert!(!repo.cooldown_settings().enabled);
        }

        #[test]
        fn test_install_clears_session_records() {
            let repo = Repository::in_memory();
            let mut blocked = BlockedSites::new();
            blocked.insert("reddit.com".to_string(), BlockedSite::open(0, 60));
            repo.set_blocked_sites(&blocked).unwrap();

            repo.install().unwrap();
            assert!(repo.blocked_sites().is_empty());
        }

        #[test]
        fn test_initialize_clears_timers_keeps_blocks() {
            let repo = Repository::in_memory();
            repo.install().unwrap();

            let mut timers = ActiveTimers::new();
            timers.insert(
                1,
                ActiveTimer {
                    site: "reddit.com".to_string(),
                    minutes: 10,
                    start_time: 1,
                    alarm_name: "close_tab_1".to_string(),
                },
            );
            repo.set_active_timers(&timers).unwrap();

            let mut blocked = BlockedSites::new();
            blocked.insert("reddit.com".to_string(), BlockedSite::open(0, 60));
            repo.set_blocked_sites(&blocked).unwrap();

            // Simulated restart.
            repo.initialize().unwrap();

            assert!(repo.active_timers().is_empty());
            assert_eq!(repo.blocked_sites().len(), 1);
        }

        #[test]
        fn test_initialize_first_run_installs() {
            let repo = Repository::in_memory();
            repo.initialize().unwrap();
            assert_eq!(repo.site_configs(), default_site_configs());
        }
    }

    // ------------------------------------------------------------------------
    // Helper Tests
    // ------------------------------------------------------------------------

    mod helper_tests {
        use super::*;

        #[test]
        fn test_dedup_preserves_first_seen_order() {
            let deduped = dedup_preserving_order(vec![
                "b".to_string(),
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
                "a".to_string(),
            ]);
            assert_eq!(deduped, vec!["b", "a", "c"]);
        }

        #[test]
        fn test_dedup_empty() {
            assert!(dedup_preserving_order(Vec::new()).is_empty());
        }
    }
}
