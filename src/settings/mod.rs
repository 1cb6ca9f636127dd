//! Device settings storage
//!
//! This module handles:
//! - Holding the active configuration record for this unit
//! - Seeding it from the factory profile or the persisted record at boot
//! - Validating and persisting changes requested through `SaveSettings`

mod persistence;
mod store;

pub use persistence::{FilePersistence, MemoryPersistence, SettingsPersistence};
pub use store::{SettingsError, SettingsReader, SettingsStore};
