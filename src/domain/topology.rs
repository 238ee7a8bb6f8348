use crate::domain::device::{normalize_wwn, BlockDevice, DeviceRecord, Disk};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// How strictly WWNs must agree before a controller record is joined to a block device.
///
/// Some controller families report a GUID whose last digit differs from the WWN
/// the OS sees; `TolerateOneDigit` absorbs that, and only applies when no record
/// matched exactly or by serial.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WwnMatching {
    #[default]
    Exact,
    TolerateOneDigit,
}

pub struct DeviceMatcher {
    wwn_matching: WwnMatching,
}

impl DeviceMatcher {
    pub fn new(wwn_matching: WwnMatching) -> Self {
        Self { wwn_matching }
    }

    /// Join controller records to system block devices by WWN or serial.
    ///
    /// Returns one disk per system device, except that several devices landing on
    /// the same controller bay (multipath) collapse into one, preferring the
    /// aggregate device name. Devices no record matches are kept, unmatched.
    pub fn correlate(&self, controller_disks: &[DeviceRecord], system_devices: &[BlockDevice]) -> Vec<Disk> {
        let mut disks: Vec<Disk> = Vec::new();
        let mut bays: HashMap<(String, String, u32), usize> = HashMap::new();
        let mut used_records: HashSet<(String, String, u32)> = HashSet::new();

        for device in system_devices {
            let record = match self.find_record(controller_disks, device) {
                Some(record) => record,
                None => {
                    debug!("{} has no controller record", device.name);
                    disks.push(Disk::unmatched(device));
                    continue;
                }
            };

            let (controller, enclosure, slot) = record.bay();
            let bay = (controller.to_string(), enclosure.to_string(), slot);
            used_records.insert(bay.clone());

            match bays.get(&bay).copied() {
                Some(idx) => {
                    let existing = &disks[idx].dev_name;
                    if is_multipath_name(&device.name) && !is_multipath_name(existing) {
                        debug!(
                            "Replacing path {} with multipath device {} for bay {}:{}:{}",
                            existing, device.name, bay.0, bay.1, bay.2
                        );
                        disks[idx] = Disk::matched(record, device);
                    } else {
                        debug!(
                            "Skipping duplicate path {} for bay {}:{}:{} (kept {})",
                            device.name, bay.0, bay.1, bay.2, existing
                        );
                    }
                }
                None => {
                    debug!(
                        "{} -> controller {} enclosure {} slot {} (serial {})",
                        device.name, bay.0, bay.1, bay.2, record.serial
                    );
                    bays.insert(bay, disks.len());
                    disks.push(Disk::matched(record, device));
                }
            }
        }

        let unseen = controller_disks
            .iter()
            .filter(|r| {
                let (c, e, s) = r.bay();
                !used_records.contains(&(c.to_string(), e.to_string(), s))
            })
            .count();
        debug!(
            "Matched {} bays, {} system devices without controller record, {} controller records without system device",
            bays.len(),
            disks.iter().filter(|d| !d.matched).count(),
            unseen
        );

        disks
    }

    fn find_record<'r>(&self, records: &'r [DeviceRecord], device: &BlockDevice) -> Option<&'r DeviceRecord> {
        let device_wwn = normalize_wwn(&device.wwn);
        let device_serial = device.serial.trim();

        let exact = records.iter().find(|record| {
            let wwn_match = !device_wwn.is_empty() && normalize_wwn(&record.wwn) == device_wwn;
            let serial_match = !device_serial.is_empty() && record.serial.trim() == device_serial;
            wwn_match || serial_match
        });
        if exact.is_some() || self.wwn_matching == WwnMatching::Exact {
            return exact;
        }

        let fuzzy = records.iter().find(|record| {
            let record_serial = record.serial.trim();
            let serials_conflict =
                !device_serial.is_empty() && !record_serial.is_empty() && record_serial != device_serial;
            !serials_conflict && wwn_differs_by_one_digit(&normalize_wwn(&record.wwn), &device_wwn)
        });
        if let Some(record) = fuzzy {
            debug!(
                "{} matched {} by WWN with one differing digit ({} vs {})",
                device.name, record.serial, device.wwn, record.wwn
            );
        }
        fuzzy
    }
}

impl Default for DeviceMatcher {
    fn default() -> Self {
        Self::new(WwnMatching::Exact)
    }
}

/// Device-mapper and GEOM multipath names aggregate several per-path devices
pub fn is_multipath_name(name: &str) -> bool {
    let short = name.strip_prefix("/dev/").unwrap_or(name);
    short.starts_with("dm-") || short.starts_with("mapper/") || short.starts_with("multipath/")
}

/// Equal-length, non-empty identifiers with a Hamming distance of at most one
fn wwn_differs_by_one_digit(a: &str, b: &str) -> bool {
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    a.chars().zip(b.chars()).filter(|(x, y)| x != y).count() <= 1
}
