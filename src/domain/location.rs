//! Physical location mapping.
//!
//! Every matched disk gets an enclosure display name, a physical slot and a
//! logical disk number. The first applicable rule wins:
//!
//! 1. a per-serial custom mapping,
//! 2. the configuration entry resolved for the disk's enclosure,
//! 3. positional defaults derived from the raw controller slot.

use crate::domain::device::Disk;
use crate::domain::enclosure::{Enclosure, EnclosureConfig, EnclosureRegistry, TYPE_UNKNOWN};
use crate::domain::overlay::{DiskMapping, DiskMappings, CUSTOM_ENCLOSURE};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

pub const LOCAL_ENCLOSURE: &str = "Local";
pub const LOCATION_TAG_PREFIX: &str = "Loc:";

/// How the logical disk number relates to the physical slot for configured enclosures
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalNumbering {
    /// logical_disk = physical_slot
    #[default]
    SameAsSlot,
    /// logical_disk = physical_slot - 1
    ZeroBased,
}

impl LogicalNumbering {
    pub fn logical_disk(self, physical_slot: i64) -> i64 {
        match self {
            LogicalNumbering::SameAsSlot => physical_slot,
            LogicalNumbering::ZeroBased => physical_slot - 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Location {
    pub enclosure_name: String,
    pub physical_slot: i64,
    pub logical_disk: i64,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};SLOT:{};DISK:{}",
            self.enclosure_name, self.physical_slot, self.logical_disk
        )
    }
}

impl Disk {
    pub fn apply_location(&mut self, location: Location) {
        self.enclosure_name = location.enclosure_name;
        self.physical_slot = location.physical_slot;
        self.logical_disk = location.logical_disk;
    }

    pub fn location_info(&self) -> Option<Location> {
        if !self.is_located() {
            return None;
        }
        Some(Location {
            enclosure_name: self.enclosure_name.clone(),
            physical_slot: self.physical_slot,
            logical_disk: self.logical_disk,
        })
    }
}

pub struct LocationMapper<'a> {
    registry: &'a EnclosureRegistry,
    overlay: &'a DiskMappings,
    numbering: LogicalNumbering,
}

impl<'a> LocationMapper<'a> {
    pub fn new(registry: &'a EnclosureRegistry, overlay: &'a DiskMappings) -> Self {
        Self {
            registry,
            overlay,
            numbering: LogicalNumbering::default(),
        }
    }

    pub fn with_numbering(mut self, numbering: LogicalNumbering) -> Self {
        self.numbering = numbering;
        self
    }

    /// Compute the location of a single disk.
    ///
    /// `primary_enclosure` is the enclosure id that gets the "Local" name when
    /// neither a config nor a meaningful enclosure type is available.
    pub fn map(
        &self,
        disk: &Disk,
        enclosure: Option<&Enclosure>,
        config: Option<&EnclosureConfig>,
        custom: Option<&DiskMapping>,
        primary_enclosure: Option<&str>,
    ) -> Location {
        if let Some(custom) = custom {
            debug!("Using custom mapping for disk with serial {}", disk.serial);
            let enclosure_name = if custom.enclosure.is_empty() {
                CUSTOM_ENCLOSURE.to_string()
            } else {
                custom.enclosure.clone()
            };
            return Location {
                enclosure_name,
                physical_slot: custom.slot,
                logical_disk: custom.disk,
            };
        }

        if let Some(config) = config {
            let physical_slot = configured_slot(disk.slot, enclosure, config);
            let logical_disk = self.numbering.logical_disk(physical_slot);
            debug!(
                "{}: slot={}, hw_start={:?}, physical_slot={}, logical_disk={}",
                disk.dev_name,
                disk.slot,
                enclosure.map(|e| e.hw_start_slot),
                physical_slot,
                logical_disk
            );
            return Location {
                enclosure_name: config.name.clone(),
                physical_slot,
                logical_disk,
            };
        }

        Location {
            enclosure_name: default_enclosure_name(disk, enclosure, primary_enclosure),
            physical_slot: i64::from(disk.slot) + 1,
            logical_disk: i64::from(disk.slot),
        }
    }

    /// Resolve enclosure, config and custom mapping for every disk and apply the result.
    ///
    /// Disks no controller reported only receive custom mappings.
    pub fn map_all(&self, disks: Vec<Disk>) -> Vec<Disk> {
        let primary = primary_enclosure(&disks);
        debug!("Primary enclosure: {:?}", primary);

        disks
            .into_iter()
            .map(|mut disk| {
                let custom = self.overlay.get(&disk.serial);
                if !disk.matched && custom.is_none() {
                    return disk;
                }

                let enclosure = self.registry.lookup_enclosure(&disk.controller, &disk.enclosure);
                if disk.matched && enclosure.is_none() {
                    debug!(
                        "No enclosure {}:{} reported for {}",
                        disk.controller, disk.enclosure, disk.dev_name
                    );
                }
                let config = enclosure.and_then(|e| self.registry.resolve_config(e));
                let location = self.map(&disk, enclosure, config, custom, primary.as_deref());
                disk.apply_location(location);
                disk
            })
            .collect()
    }
}

/// physical_slot = start_slot + (slot - hw_start_slot) + offset
///
/// A slot below the hardware start slot means the start-slot data is wrong;
/// the raw slot is used as the relative number instead.
fn configured_slot(slot: u32, enclosure: Option<&Enclosure>, config: &EnclosureConfig) -> i64 {
    let hw_start = enclosure
        .map(|e| e.hw_start_slot)
        .filter(|s| *s > 0)
        .unwrap_or(1);

    let mut real_drive_num = i64::from(slot) - i64::from(hw_start);
    if real_drive_num < 0 {
        debug!(
            "Slot {} is below hardware start slot {}, treating it as absolute",
            slot, hw_start
        );
        real_drive_num = i64::from(slot);
    }

    config.start_slot + real_drive_num + config.offset
}

fn default_enclosure_name(
    disk: &Disk,
    enclosure: Option<&Enclosure>,
    primary_enclosure: Option<&str>,
) -> String {
    if let Some(enc) = enclosure {
        let enclosure_type = enc.effective_type();
        if enclosure_type != TYPE_UNKNOWN {
            return enclosure_type.to_string();
        }
    }

    let enclosure_id = enclosure
        .map(|e| e.enclosure_id.as_str())
        .unwrap_or(disk.enclosure.as_str());

    if enclosure_id.is_empty() {
        "-".to_string()
    } else if Some(enclosure_id) == primary_enclosure {
        LOCAL_ENCLOSURE.to_string()
    } else {
        format!("Enclosure-{}", enclosure_id)
    }
}

/// Smallest enclosure id among matched disks. Numeric ids order numerically
/// and sort before non-numeric ones.
pub fn primary_enclosure(disks: &[Disk]) -> Option<String> {
    let ids: BTreeSet<&str> = disks
        .iter()
        .filter(|d| d.matched && !d.enclosure.is_empty())
        .map(|d| d.enclosure.as_str())
        .collect();

    ids.into_iter()
        .min_by(|a, b| compare_enclosure_ids(a, b))
        .map(str::to_string)
}

fn compare_enclosure_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Stable presentation order: located disks by (enclosure_name, physical_slot),
/// then disks without a location, ties broken by device name
pub fn sort_for_presentation(disks: &mut [Disk]) {
    disks.sort_by(|a, b| {
        (!a.is_located(), &a.enclosure_name, a.physical_slot, &a.dev_name).cmp(&(
            !b.is_located(),
            &b.enclosure_name,
            b.physical_slot,
            &b.dev_name,
        ))
    });
}

/// What the description-update sink needs for one disk
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocationUpdate {
    pub identifier: String,
    pub enclosure_name: String,
    pub physical_slot: i64,
    pub logical_disk: i64,
    pub tag: String,
}

/// Update tuples for every located disk with a device name
pub fn location_updates(disks: &[Disk]) -> Vec<LocationUpdate> {
    disks
        .iter()
        .filter(|d| !d.dev_name.is_empty())
        .filter_map(|d| {
            let location = d.location_info()?;
            Some(LocationUpdate {
                identifier: d.short_name().to_string(),
                tag: location_tag(&location),
                enclosure_name: location.enclosure_name,
                physical_slot: location.physical_slot,
                logical_disk: location.logical_disk,
            })
        })
        .collect()
}

pub fn location_tag(location: &Location) -> String {
    format!("{}{}", LOCATION_TAG_PREFIX, location)
}

fn location_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Loc:[^;\n]*;SLOT:\S*;DISK:\S*|Loc:\S+").expect("location tag pattern is valid")
    })
}

/// Replace any previous `Loc:` tag in a free-text description with the new location
pub fn rewrite_location_tag(description: &str, location: &Location) -> String {
    let cleaned = location_tag_pattern().replace_all(description.trim(), "");
    let cleaned = cleaned.trim();
    let tag = location_tag(location);
    if cleaned.is_empty() {
        tag
    } else {
        format!("{} {}", cleaned, tag)
    }
}
