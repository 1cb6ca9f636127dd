//! Active configuration record with a single validated write path

use super::persistence::{PersistenceError, SettingsPersistence};
use incubator_shared::{DeviceConfiguration, ValidationError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Reasons a save was refused; the active record is unchanged in every case
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Persisting settings timed out after {0:?}")]
    Timeout(Duration),
}

/// Owns the active configuration. `save` is the only way to change it.
pub struct SettingsStore {
    unit_id: u32,
    active: Arc<RwLock<DeviceConfiguration>>,
    persistence: Arc<dyn SettingsPersistence>,
    /// Upper bound for a persistence read or for staging a write
    io_timeout: Duration,
}

/// Read-only handle for control loops and exporters
#[derive(Clone)]
pub struct SettingsReader {
    active: Arc<RwLock<DeviceConfiguration>>,
}

impl SettingsReader {
    /// Copy of the active record
    pub async fn snapshot(&self) -> DeviceConfiguration {
        self.active.read().await.clone()
    }
}

impl SettingsStore {
    /// Create a store for `unit_id`, active with that unit's factory profile
    /// until `load` runs
    pub fn new(
        unit_id: u32,
        persistence: Arc<dyn SettingsPersistence>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            unit_id,
            active: Arc::new(RwLock::new(DeviceConfiguration::factory_default(unit_id))),
            persistence,
            io_timeout,
        }
    }

    pub fn unit_id(&self) -> u32 {
        self.unit_id
    }

    pub fn reader(&self) -> SettingsReader {
        SettingsReader {
            active: self.active.clone(),
        }
    }

    /// Copy of the active record
    pub async fn snapshot(&self) -> DeviceConfiguration {
        self.active.read().await.clone()
    }

    /// Activate the persisted record for this unit, or the factory profile
    /// when nothing usable is stored
    pub async fn load(&self) -> DeviceConfiguration {
        let record = match self.read_persisted().await {
            Some(record) => {
                info!(
                    "Loaded persisted settings for unit {}: {:.1}C {:.1}%RH",
                    record.id, record.setpoint_temperature, record.setpoint_humidity
                );
                record
            }
            None => {
                let record = DeviceConfiguration::factory_default(self.unit_id);
                info!(
                    "Using factory settings for unit {}: {:.1}C {:.1}%RH",
                    record.id, record.setpoint_temperature, record.setpoint_humidity
                );
                record
            }
        };

        *self.active.write().await = record.clone();
        record
    }

    async fn read_persisted(&self) -> Option<DeviceConfiguration> {
        let read = match timeout(self.io_timeout, self.persistence.read(self.unit_id)).await {
            Ok(read) => read,
            Err(_) => {
                warn!("Reading persisted settings timed out after {:?}", self.io_timeout);
                return None;
            }
        };

        let record = match read {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No persisted settings for unit {}", self.unit_id);
                return None;
            }
            Err(e) => {
                warn!("Ignoring unreadable persisted settings: {}", e);
                return None;
            }
        };

        if record.id != self.unit_id {
            warn!(
                "Ignoring persisted settings for unit {} (running as unit {})",
                record.id, self.unit_id
            );
            return None;
        }
        if let Err(e) = record.validate() {
            warn!("Ignoring invalid persisted settings: {}", e);
            return None;
        }

        Some(record)
    }

    /// Validate, persist and then activate `record`
    pub async fn save(&self, record: DeviceConfiguration) -> Result<(), SettingsError> {
        // Held across the write so no reader observes a record that failed to persist
        let mut active = self.active.write().await;

        record.validate_replacement(&active)?;

        let staged = match timeout(self.io_timeout, self.persistence.stage(&record)).await {
            Ok(result) => result?,
            Err(_) => return Err(SettingsError::Timeout(self.io_timeout)),
        };

        // Not bounded: once the record is committed it must also become active
        self.persistence.commit(staged).await?;

        info!(
            "Settings saved for unit {}: {:.1}C {:.1}%RH ip={} mask={}",
            record.id,
            record.setpoint_temperature,
            record.setpoint_humidity,
            record.ip_address,
            record.subnet_mask
        );
        *active = record;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::persistence::StagedRecord;
    use crate::settings::{FilePersistence, MemoryPersistence};
    use async_trait::async_trait;
    use incubator_shared::now_ms;

    const IO_TIMEOUT: Duration = Duration::from_millis(200);

    fn store_with(unit_id: u32) -> (SettingsStore, Arc<MemoryPersistence>) {
        let persistence = Arc::new(MemoryPersistence::new());
        let store = SettingsStore::new(unit_id, persistence.clone(), IO_TIMEOUT);
        (store, persistence)
    }

    #[tokio::test]
    async fn test_load_without_persisted_record_uses_profile() {
        let (store, _) = store_with(0);
        let config = store.load().await;
        assert_eq!(config.setpoint_temperature, 30.0);
        assert_eq!(config.setpoint_humidity, 70.0);

        let (store, _) = store_with(1);
        let config = store.load().await;
        assert_eq!(config.id, 1);
        assert_eq!(config.setpoint_temperature, 31.5);
        assert_eq!(config.setpoint_humidity, 70.0);
        assert_eq!(store.snapshot().await, config);
    }

    #[tokio::test]
    async fn test_load_prefers_persisted_record() {
        let (store, persistence) = store_with(0);
        let mut stored = DeviceConfiguration::factory_default(0);
        stored.setpoint_temperature = 33.0;
        persistence.insert(stored.clone()).await;

        assert_eq!(store.load().await, stored);
        assert_eq!(store.reader().snapshot().await, stored);
    }

    #[tokio::test]
    async fn test_load_ignores_invalid_persisted_record() {
        let (store, persistence) = store_with(0);
        let mut stored = DeviceConfiguration::factory_default(0);
        stored.setpoint_humidity = 150.0;
        persistence.insert(stored).await;

        assert_eq!(store.load().await, DeviceConfiguration::factory_default(0));
    }

    #[tokio::test]
    async fn test_save_commits_valid_record() {
        let (store, persistence) = store_with(0);
        store.load().await;
        let reader = store.reader();

        let mut record = store.snapshot().await;
        record.setpoint_temperature = 32.0;
        record.setpoint_humidity = 65.0;
        store.save(record.clone()).await.unwrap();

        assert_eq!(reader.snapshot().await, record);
        assert_eq!(persistence.read(0).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let (store, persistence) = store_with(0);
        store.load().await;

        let mut record = store.snapshot().await;
        record.setpoint_temperature = 31.0;

        store.save(record.clone()).await.unwrap();
        let after_once = (store.snapshot().await, persistence.read(0).await.unwrap());

        store.save(record.clone()).await.unwrap();
        let after_twice = (store.snapshot().await, persistence.read(0).await.unwrap());

        assert_eq!(after_once, after_twice);
    }

    #[tokio::test]
    async fn test_invalid_save_leaves_record_unchanged() {
        let (store, persistence) = store_with(0);
        let before = store.load().await;

        let mut record = before.clone();
        record.setpoint_temperature = 35.0;
        record.setpoint_humidity = 150.0;

        let result = store.save(record).await;
        assert!(matches!(
            result,
            Err(SettingsError::Validation(ValidationError::HumidityOutOfRange { .. }))
        ));
        assert_eq!(store.snapshot().await, before);
        assert_eq!(persistence.write_count(), 0);
    }

    #[tokio::test]
    async fn test_mac_change_is_rejected() {
        let (store, _) = store_with(0);
        let before = store.load().await;

        let mut record = before.clone();
        record.mac_address = incubator_shared::MacAddress([2, 0, 0, 0, 0, 1]);

        assert!(matches!(
            store.save(record).await,
            Err(SettingsError::Validation(ValidationError::MacAddressChanged { .. }))
        ));
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_record_unchanged() {
        let (store, persistence) = store_with(0);
        let before = store.load().await;
        persistence.set_unavailable(true);

        let mut record = before.clone();
        record.setpoint_temperature = 32.0;

        assert!(matches!(
            store.save(record).await,
            Err(SettingsError::Persistence(_))
        ));
        assert_eq!(store.snapshot().await, before);
    }

    struct StalledPersistence;

    #[async_trait]
    impl SettingsPersistence for StalledPersistence {
        async fn read(&self, _unit_id: u32) -> Result<Option<DeviceConfiguration>, PersistenceError> {
            std::future::pending().await
        }

        async fn stage(&self, _record: &DeviceConfiguration) -> Result<StagedRecord, PersistenceError> {
            std::future::pending().await
        }

        async fn commit(&self, _staged: StagedRecord) -> Result<(), PersistenceError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_persistence_times_out() {
        let store = SettingsStore::new(1, Arc::new(StalledPersistence), IO_TIMEOUT);
        let before = store.load().await;
        assert_eq!(before, DeviceConfiguration::factory_default(1));

        let mut record = before.clone();
        record.setpoint_temperature = 25.0;

        assert!(matches!(
            store.save(record).await,
            Err(SettingsError::Timeout(_))
        ));
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_timed_out_save_matches_persisted_record() {
        let dir = std::env::temp_dir().join(format!(
            "incubator-timeout-{}-{}",
            std::process::id(),
            now_ms()
        ));
        let store = SettingsStore::new(0, Arc::new(FilePersistence::new(&dir)), Duration::ZERO);
        let before = store.load().await;

        let mut record = before.clone();
        record.setpoint_temperature = 33.0;
        let result = store.save(record).await;
        assert!(matches!(result, Ok(()) | Err(SettingsError::Timeout(_))));
        if result.is_err() {
            assert_eq!(store.snapshot().await, before);
        }

        // Give an abandoned staging write time to land
        tokio::time::sleep(Duration::from_millis(100)).await;

        let rebooted = SettingsStore::new(0, Arc::new(FilePersistence::new(&dir)), IO_TIMEOUT);
        assert_eq!(rebooted.load().await, store.snapshot().await);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
