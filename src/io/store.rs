//! Persistent store - the single latest `ParkingRecord` as a JSON document
//!
//! Writes go to a temporary sibling file which is fsynced and then renamed over
//! the target, so readers see either the old or the new complete document.

use crate::domain::types::ParkingRecord;
use crate::infra::error::StoreError;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of a load that never fails
#[derive(Debug)]
pub struct Loaded {
    pub record: ParkingRecord,
    /// Why the zero-valued default was substituted, if it was
    pub condition: Option<StoreError>,
}

pub struct JsonStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read and decode the current record
    pub fn load(&self) -> Result<ParkingRecord, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::Missing { path: self.display() })
            }
            Err(source) => return Err(StoreError::Unavailable { path: self.display(), source }),
        };

        serde_json::from_str(&content)
            .map_err(|source| StoreError::Corrupt { path: self.display(), source })
    }

    /// Read the current record, substituting the zero-valued default on any failure
    pub fn load_or_default(&self) -> Loaded {
        match self.load() {
            Ok(record) => Loaded { record, condition: None },
            Err(e) => Loaded { record: ParkingRecord::default(), condition: Some(e) },
        }
    }

    /// Atomically replace the stored record
    pub fn save(&self, record: &ParkingRecord) -> Result<(), StoreError> {
        let unavailable = |source| StoreError::Unavailable { path: self.display(), source };

        let mut body = Vec::with_capacity(512);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut body, formatter);
        record
            .serialize(&mut serializer)
            .map_err(|source| StoreError::Corrupt { path: self.display(), source })?;

        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(unavailable)?;
            }
        }

        let temp = self.temp_path();
        let written = (|| {
            let mut file = File::create(&temp)?;
            file.write_all(&body)?;
            file.sync_all()?;
            fs::rename(&temp, &self.path)
        })();

        if let Err(source) = written {
            let _ = fs::remove_file(&temp);
            return Err(unavailable(source));
        }

        debug!(path = %self.display(), bytes = %body.len(), "store_saved");
        Ok(())
    }
}
