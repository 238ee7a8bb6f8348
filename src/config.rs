//! User configuration: enclosure naming rules and per-disk overrides.
//!
//! ```yaml
//! logical_disk: same_as_slot      # or zero_based
//! wwn_matching: exact             # or tolerate_one_digit, overrides the controller default
//! enclosures:
//!   - id: "SAS3x48Front"          # product id, logical id (SAS address) or enclosure id
//!     name: "Front JBOD"
//!     start_slot: 1
//!     max_slots: 48
//!     offset: 0
//! disks:
//!   - serial: "ABC123"
//!     enclosure: "Top"
//!     slot: 5
//!     disk: 1
//! ```

use crate::domain::enclosure::{Enclosure, EnclosureConfig, EnclosureRegistry};
use crate::domain::location::LogicalNumbering;
use crate::domain::overlay::{DiskMapping, DiskMappings, CUSTOM_ENCLOSURE};
use crate::domain::topology::WwnMatching;
use crate::error::{Result, TopologyError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./storage_topology.conf";

#[derive(Debug, Default)]
pub struct Config {
    pub numbering: LogicalNumbering,
    pub wwn_matching: Option<WwnMatching>,
    pub registry: EnclosureRegistry,
    pub overlay: DiskMappings,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    logical_disk: Option<LogicalNumbering>,
    #[serde(default)]
    wwn_matching: Option<WwnMatching>,
    #[serde(default)]
    enclosures: Vec<serde_yaml::Value>,
    #[serde(default)]
    disks: Vec<serde_yaml::Value>,
}

/// YAML scalars arrive as numbers or strings depending on how the user quoted them
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Text(String),
}

impl Scalar {
    fn text(&self) -> String {
        match self {
            Scalar::Int(n) => n.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }

    fn int(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEnclosure {
    id: Option<Scalar>,
    name: Option<Scalar>,
    start_slot: Option<Scalar>,
    max_slots: Option<Scalar>,
    offset: Option<Scalar>,
}

#[derive(Debug, Deserialize)]
struct RawDiskMapping {
    serial: Option<Scalar>,
    enclosure: Option<Scalar>,
    slot: Option<Scalar>,
    disk: Option<Scalar>,
}

impl Config {
    /// Load the configuration file. A missing file yields an empty configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let path = expand_home(path);
        if !path.exists() {
            warn!(
                "Configuration file {} not found. Using default settings.",
                path.display()
            );
            return Ok(Self::default());
        }

        info!("Loading user configuration from {}", path.display());
        let contents = fs::read_to_string(&path).map_err(|source| TopologyError::ConfigRead {
            path: path.clone(),
            source,
        })?;
        Self::parse(&contents, &path)
    }

    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        if contents.trim().is_empty() {
            warn!("Configuration file {} is empty", path.display());
            return Ok(Self::default());
        }

        let raw: Option<RawConfig> =
            serde_yaml::from_str(contents).map_err(|source| TopologyError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        let raw = raw.unwrap_or_default();

        let mut config = Config {
            numbering: raw.logical_disk.unwrap_or_default(),
            wwn_matching: raw.wwn_matching,
            ..Default::default()
        };

        if !raw.enclosures.is_empty() {
            info!("Found {} enclosure configurations", raw.enclosures.len());
        }
        for value in raw.enclosures {
            if let Some(entry) = enclosure_entry(value) {
                config.registry.register_config(entry);
            }
        }

        if !raw.disks.is_empty() {
            info!("Found {} custom disk mappings", raw.disks.len());
        }
        for value in raw.disks {
            if let Some(entry) = disk_entry(value) {
                config.overlay.insert(entry);
            }
        }

        debug!(
            "Configuration: numbering {:?}, wwn matching {:?}, {} enclosure configs, {} disk mappings",
            config.numbering,
            config.wwn_matching,
            config.registry.configs().count(),
            config.overlay.len()
        );
        Ok(config)
    }
}

fn enclosure_entry(value: serde_yaml::Value) -> Option<EnclosureConfig> {
    let raw: RawEnclosure = match serde_yaml::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Skipping malformed enclosure config: {}", e);
            return None;
        }
    };

    let id = raw.id.as_ref().map(Scalar::text).unwrap_or_default();
    if id.trim().is_empty() {
        warn!("Skipping enclosure config without ID");
        return None;
    }

    let mut entry = EnclosureConfig::new(id, raw.name.as_ref().map(Scalar::text).unwrap_or_default());
    entry.start_slot = int_field(&raw.start_slot, "start_slot", &entry.id)?.unwrap_or(1);
    entry.offset = int_field(&raw.offset, "offset", &entry.id)?.unwrap_or(0);
    let max_slots = int_field(&raw.max_slots, "max_slots", &entry.id)?.unwrap_or(0);
    entry.max_slots = match u32::try_from(max_slots) {
        Ok(n) => n,
        Err(_) => {
            warn!("Skipping enclosure config {}: max_slots {} out of range", entry.id, max_slots);
            return None;
        }
    };
    Some(entry)
}

fn disk_entry(value: serde_yaml::Value) -> Option<DiskMapping> {
    let raw: RawDiskMapping = match serde_yaml::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Skipping malformed disk mapping: {}", e);
            return None;
        }
    };

    let serial = raw.serial.as_ref().map(Scalar::text).unwrap_or_default();
    if serial.is_empty() {
        warn!("Skipping disk mapping without serial number");
        return None;
    }

    let enclosure = raw
        .enclosure
        .as_ref()
        .map(Scalar::text)
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| CUSTOM_ENCLOSURE.to_string());
    let slot = int_field(&raw.slot, "slot", &serial)?.unwrap_or(0);
    let disk = int_field(&raw.disk, "disk", &serial)?.unwrap_or(0);

    Some(DiskMapping {
        serial,
        enclosure,
        slot,
        disk,
    })
}

/// `None` rejects the entry; `Some(None)` means the field was absent
fn int_field(value: &Option<Scalar>, field: &str, owner: &str) -> Option<Option<i64>> {
    match value {
        None => Some(None),
        Some(scalar) => match scalar.int() {
            Some(n) => Some(Some(n)),
            None => {
                warn!(
                    "Skipping entry {}: {} '{}' is not a number",
                    owner,
                    field,
                    scalar.text()
                );
                None
            }
        },
    }
}

#[derive(Serialize)]
struct Template {
    enclosures: Vec<EnclosureConfig>,
}

/// YAML `enclosures:` section naming every given enclosure, ready to paste into the config file
pub fn enclosure_template<'a>(
    enclosures: impl IntoIterator<Item = &'a Enclosure>,
) -> serde_yaml::Result<String> {
    let template = Template {
        enclosures: enclosures.into_iter().map(EnclosureConfig::template_for).collect(),
    };
    serde_yaml::to_string(&template)
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
