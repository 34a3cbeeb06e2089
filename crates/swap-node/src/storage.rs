//! Persistent device settings: the configuration memory analogue.
//!
//! A small fixed-layout blob with a sentinel flag byte distinguishing
//! "never configured" from "configured", so a node knows whether to load
//! stored settings or initialize from its factory defaults. Writes are
//! atomic (write to `.tmp`, then rename) to prevent corruption.

use std::path::{Path, PathBuf};

/// Blob layout: flag, channel, security, network id (2), address,
/// tx interval (2).
const SETTINGS_LEN: usize = 8;

/// Flag byte value meaning the blob holds real settings.
const FLAG_STORED: u8 = 0x00;

/// Flag byte value of an erased blob.
const FLAG_EMPTY: u8 = 0xFF;

/// File name of the settings blob inside the storage directory.
const SETTINGS_FILE: &str = "settings";

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings blob corrupt: expected {expected} bytes, got {actual}")]
    Corrupt { expected: usize, actual: usize },

    #[error("failed to determine storage directory: {0}")]
    Directory(String),
}

/// The device settings that survive power cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    pub address: u8,
    pub channel: u8,
    pub security: u8,
    pub network_id: [u8; 2],
    pub tx_interval: u16,
}

impl DeviceSettings {
    fn to_blob(self) -> [u8; SETTINGS_LEN] {
        [
            FLAG_STORED,
            self.channel,
            self.security,
            self.network_id[0],
            self.network_id[1],
            self.address,
            (self.tx_interval >> 8) as u8,
            self.tx_interval as u8,
        ]
    }

    fn from_blob(blob: &[u8; SETTINGS_LEN]) -> Self {
        DeviceSettings {
            channel: blob[1],
            security: blob[2],
            network_id: [blob[3], blob[4]],
            address: blob[5],
            tx_interval: ((blob[6] as u16) << 8) | blob[7] as u16,
        }
    }
}

/// Persistent storage for device settings.
pub struct Storage {
    base_dir: PathBuf,
}

impl Storage {
    /// Create a new storage instance, creating the directory if needed.
    pub fn new(base_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Create storage at the default path (`~/.swap`).
    pub fn default_path() -> Result<Self, StorageError> {
        let home = dirs::home_dir()
            .ok_or_else(|| StorageError::Directory("could not determine home directory".into()))?;
        Self::new(home.join(".swap"))
    }

    /// Load stored settings. Returns `Ok(None)` when the device was never
    /// configured (missing file or erased sentinel).
    pub fn load(&self) -> Result<Option<DeviceSettings>, StorageError> {
        let path = self.base_dir.join(SETTINGS_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };
        let blob: [u8; SETTINGS_LEN] = bytes.as_slice().try_into().map_err(|_| {
            StorageError::Corrupt {
                expected: SETTINGS_LEN,
                actual: bytes.len(),
            }
        })?;
        if blob[0] != FLAG_STORED {
            return Ok(None);
        }
        Ok(Some(DeviceSettings::from_blob(&blob)))
    }

    /// Persist settings atomically.
    pub fn save(&self, settings: &DeviceSettings) -> Result<(), StorageError> {
        self.atomic_write(&self.base_dir.join(SETTINGS_FILE), &settings.to_blob())
    }

    /// Mark the device as never configured.
    pub fn erase(&self) -> Result<(), StorageError> {
        let mut blob = [FLAG_EMPTY; SETTINGS_LEN];
        blob[0] = FLAG_EMPTY;
        self.atomic_write(&self.base_dir.join(SETTINGS_FILE), &blob)
    }

    fn atomic_write(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
