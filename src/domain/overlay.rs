use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CUSTOM_ENCLOSURE: &str = "Custom";

/// Fixed location for one disk, keyed by serial
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskMapping {
    pub serial: String,
    pub enclosure: String,
    pub slot: i64,
    pub disk: i64,
}

impl DiskMapping {
    pub fn new(serial: impl Into<String>, slot: i64, disk: i64) -> Self {
        Self {
            serial: serial.into(),
            enclosure: CUSTOM_ENCLOSURE.to_string(),
            slot,
            disk,
        }
    }
}

/// Per-serial overrides that bypass positional computation
#[derive(Debug, Default)]
pub struct DiskMappings {
    by_serial: HashMap<String, DiskMapping>,
}

impl DiskMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries without a serial are rejected; a repeated serial replaces the earlier entry
    pub fn insert(&mut self, mut mapping: DiskMapping) -> bool {
        if mapping.serial.is_empty() {
            warn!("Skipping disk mapping without serial number");
            return false;
        }
        if mapping.enclosure.is_empty() {
            mapping.enclosure = CUSTOM_ENCLOSURE.to_string();
        }
        debug!("Loaded custom mapping for disk {}: {:?}", mapping.serial, mapping);
        if let Some(previous) = self.by_serial.insert(mapping.serial.clone(), mapping) {
            warn!("Duplicate disk mapping for serial {}, replacing earlier entry", previous.serial);
        }
        true
    }

    pub fn get(&self, serial: &str) -> Option<&DiskMapping> {
        if serial.is_empty() {
            return None;
        }
        self.by_serial.get(serial)
    }

    pub fn len(&self) -> usize {
        self.by_serial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_serial.is_empty()
    }
}
