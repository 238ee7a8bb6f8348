use serde::{Deserialize, Serialize};

/// A drive as reported by a storage controller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRecord {
    pub serial: String,
    pub wwn: String,
    pub model: String,
    pub manufacturer: String,
    pub controller: String,
    pub enclosure: String,
    pub slot: u32, // Raw controller slot, 0- or 1-based depending on family
}

impl DeviceRecord {
    /// Key of the bay this record occupies: (controller, enclosure, slot)
    pub fn bay(&self) -> (&str, &str, u32) {
        (&self.controller, &self.enclosure, self.slot)
    }
}

/// A block device as the operating system sees it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDevice {
    pub name: String, // "/dev/sda", "/dev/dm-3"
    pub wwn: String,
    pub serial: String,
    pub model: String,
    pub vendor: String,
    pub size: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Disk {
    pub dev_name: String,
    pub serial: String,
    pub model: String,
    pub wwn: String,
    pub manufacturer: String,
    pub vendor: String,
    pub size: String,
    pub controller: String,
    pub enclosure: String,
    pub slot: u32,
    pub matched: bool, // Backed by a controller record

    // Derived by the location mapper
    pub enclosure_name: String,
    pub physical_slot: i64,
    pub logical_disk: i64,
}

impl Disk {
    /// Disk backed by a controller record, seen by the OS as `device`
    pub fn matched(record: &DeviceRecord, device: &BlockDevice) -> Self {
        Self {
            dev_name: device.name.clone(),
            serial: record.serial.clone(),
            model: record.model.clone(),
            wwn: record.wwn.clone(),
            manufacturer: record.manufacturer.clone(),
            vendor: device.vendor.clone(),
            size: device.size.clone(),
            controller: record.controller.clone(),
            enclosure: record.enclosure.clone(),
            slot: record.slot,
            matched: true,
            ..Default::default()
        }
    }

    /// OS device no controller knows about
    pub fn unmatched(device: &BlockDevice) -> Self {
        Self {
            dev_name: device.name.clone(),
            serial: device.serial.clone(),
            model: device.model.clone(),
            wwn: device.wwn.clone(),
            vendor: device.vendor.clone(),
            size: device.size.clone(),
            ..Default::default()
        }
    }

    pub fn short_name(&self) -> &str {
        self.dev_name.strip_prefix("/dev/").unwrap_or(&self.dev_name)
    }

    pub fn is_located(&self) -> bool {
        !self.enclosure_name.is_empty()
    }

    /// `"{enclosure_name};SLOT:{physical_slot};DISK:{logical_disk}"`, or "-" before mapping
    pub fn location(&self) -> String {
        if !self.is_located() {
            return "-".to_string();
        }
        format!(
            "{};SLOT:{};DISK:{}",
            self.enclosure_name, self.physical_slot, self.logical_disk
        )
    }

    /// Serializable view carrying every field plus the location string
    pub fn to_view(&self) -> DiskView<'_> {
        DiskView {
            disk: self,
            location: self.location(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DiskView<'a> {
    #[serde(flatten)]
    disk: &'a Disk,
    location: String,
}

/// Strip a leading "0x" (any case) and lower-case the rest
pub fn normalize_wwn(wwn: &str) -> String {
    let trimmed = wwn.trim();
    let bare = match trimmed.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("0x") => &trimmed[2..],
        _ => trimmed,
    };
    bare.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_wwn() {
        assert_eq!(normalize_wwn("0x5000C500A1B2C3D4"), "5000c500a1b2c3d4");
        assert_eq!(normalize_wwn("0X5000c500a1b2c3d4"), "5000c500a1b2c3d4");
        assert_eq!(normalize_wwn(" 5000C500A1B2C3D4 "), "5000c500a1b2c3d4");
        assert_eq!(normalize_wwn(""), "");
        assert_eq!(normalize_wwn("0x"), "");
    }

    #[test]
    fn test_location_string() {
        let disk = Disk {
            dev_name: "/dev/sdq".to_string(),
            enclosure_name: "Front JBOD".to_string(),
            physical_slot: 12,
            logical_disk: 11,
            ..Default::default()
        };
        assert_eq!(disk.location(), "Front JBOD;SLOT:12;DISK:11");
        assert_eq!(disk.short_name(), "sdq");
    }

    #[test]
    fn test_unlocated_disk_has_placeholder_location() {
        let disk = Disk::unmatched(&BlockDevice {
            name: "/dev/zd0".to_string(),
            ..Default::default()
        });
        assert!(!disk.matched);
        assert_eq!(disk.location(), "-");
    }

    #[test]
    fn test_view_serializes_location() {
        let disk = Disk {
            dev_name: "/dev/sda".to_string(),
            serial: "ZL2LS892".to_string(),
            enclosure_name: "Local".to_string(),
            physical_slot: 1,
            logical_disk: 0,
            ..Default::default()
        };
        let value = serde_json::to_value(disk.to_view()).unwrap();
        assert_eq!(value["dev_name"], "/dev/sda");
        assert_eq!(value["serial"], "ZL2LS892");
        assert_eq!(value["physical_slot"], 1);
        assert_eq!(value["location"], "Local;SLOT:1;DISK:0");
    }
}
