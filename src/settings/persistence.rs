//! Settings persistence backends
//!
//! The store hands validated records to a `SettingsPersistence`
//! implementation. On the device this is flash; on a development host the
//! file backend stands in for it.
//!
//! Writes happen in two steps. `stage` does the slow work and never touches
//! the live record, so it may be abandoned at any point. `commit` makes a
//! staged record live and must run to completion.

use async_trait::async_trait;
use incubator_shared::{limits::SETTINGS_FORMAT_VERSION, DeviceConfiguration};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised by a persistence backend
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Settings record encoding error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Unsupported settings format version {0} (expected {SETTINGS_FORMAT_VERSION})")]
    UnsupportedVersion(u8),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// On-disk layout of one unit's record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSettings {
    format_version: u8,
    settings: DeviceConfiguration,
}

/// A record that has been written out but is not live yet
#[derive(Debug)]
pub struct StagedRecord {
    record: DeviceConfiguration,
    /// Temporary file holding the record, for file-backed storage
    location: Option<PathBuf>,
}

/// Storage for one configuration record per unit id
#[async_trait]
pub trait SettingsPersistence: Send + Sync {
    /// Read the record stored for `unit_id`, if any
    async fn read(&self, unit_id: u32) -> Result<Option<DeviceConfiguration>, PersistenceError>;

    /// Prepare `record` for commit. Dropping this future leaves the live
    /// record untouched.
    async fn stage(&self, record: &DeviceConfiguration) -> Result<StagedRecord, PersistenceError>;

    /// Replace the record stored under the staged record's id
    async fn commit(&self, staged: StagedRecord) -> Result<(), PersistenceError>;
}

/// JSON file per unit, replaced atomically by rename on commit
pub struct FilePersistence {
    dir: PathBuf,
    /// Gives every staged write its own temporary file
    staged: AtomicU64,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            staged: AtomicU64::new(0),
        }
    }

    pub fn path_for(&self, unit_id: u32) -> PathBuf {
        self.dir.join(format!("settings-{}.json", unit_id))
    }
}

#[async_trait]
impl SettingsPersistence for FilePersistence {
    async fn read(&self, unit_id: u32) -> Result<Option<DeviceConfiguration>, PersistenceError> {
        let path = self.path_for(unit_id);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let persisted: PersistedSettings = serde_json::from_slice(&content)?;
        if persisted.format_version != SETTINGS_FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(persisted.format_version));
        }

        Ok(Some(persisted.settings))
    }

    async fn stage(&self, record: &DeviceConfiguration) -> Result<StagedRecord, PersistenceError> {
        let persisted = PersistedSettings {
            format_version: SETTINGS_FORMAT_VERSION,
            settings: record.clone(),
        };
        let content = serde_json::to_vec_pretty(&persisted)?;

        let seq = self.staged.fetch_add(1, Ordering::SeqCst);
        let dir = self.dir.clone();
        let tmp = self
            .dir
            .join(format!("settings-{}.json.{}.tmp", record.id, seq));

        // A late finish after the caller gave up only leaves an orphaned temp file
        let location = tmp.clone();
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&location, &content)
        })
        .await??;

        Ok(StagedRecord {
            record: record.clone(),
            location: Some(tmp),
        })
    }

    async fn commit(&self, staged: StagedRecord) -> Result<(), PersistenceError> {
        let tmp = staged
            .location
            .ok_or_else(|| PersistenceError::Unavailable("record was not staged to a file".into()))?;
        tokio::fs::rename(&tmp, self.path_for(staged.record.id)).await?;
        Ok(())
    }
}

/// Volatile backend for hosts without storage; nothing survives a restart
#[derive(Default)]
pub struct MemoryPersistence {
    records: Mutex<HashMap<u32, DeviceConfiguration>>,
    commits: AtomicU32,
    unavailable: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a record, as if persisted on an earlier boot
    #[cfg(test)]
    pub async fn insert(&self, record: DeviceConfiguration) {
        self.records.lock().await.insert(record.id, record);
    }

    /// Number of committed records
    #[cfg(test)]
    pub fn write_count(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail, as a worn or detached flash would
    #[cfg(test)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettingsPersistence for MemoryPersistence {
    async fn read(&self, unit_id: u32) -> Result<Option<DeviceConfiguration>, PersistenceError> {
        Ok(self.records.lock().await.get(&unit_id).cloned())
    }

    async fn stage(&self, record: &DeviceConfiguration) -> Result<StagedRecord, PersistenceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("write rejected".into()));
        }

        Ok(StagedRecord {
            record: record.clone(),
            location: None,
        })
    }

    async fn commit(&self, staged: StagedRecord) -> Result<(), PersistenceError> {
        let record = staged.record;
        self.records.lock().await.insert(record.id, record);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
