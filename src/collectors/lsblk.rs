use super::command;
use crate::domain::device::BlockDevice;
use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;

const LSBLK_COLUMNS: &str = "NAME,WWN,VENDOR,MODEL,SERIAL,SIZE";

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

/// lsblk prints `null` for attributes the kernel does not know
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LsblkDevice {
    name: Option<String>,
    wwn: Option<String>,
    vendor: Option<String>,
    model: Option<String>,
    serial: Option<String>,
    size: Option<String>,
}

impl From<LsblkDevice> for BlockDevice {
    fn from(dev: LsblkDevice) -> Self {
        let field = |v: Option<String>| v.map(|s| s.trim().to_string()).unwrap_or_default();
        BlockDevice {
            name: field(dev.name),
            wwn: field(dev.wwn),
            serial: field(dev.serial),
            model: field(dev.model),
            vendor: field(dev.vendor),
            size: field(dev.size),
        }
    }
}

/// Whole-disk block devices as the OS sees them
pub struct LsblkCollector;

impl LsblkCollector {
    pub fn new() -> Self {
        Self
    }

    pub fn collect(&self) -> Result<Vec<BlockDevice>> {
        let output = command::run("lsblk", &["-p", "-d", "-J", "-o", LSBLK_COLUMNS])
            .context("Failed to list block devices")?;
        let devices = parse_output(&output)?;
        debug!("Found {} block devices", devices.len());
        Ok(devices)
    }
}

impl Default for LsblkCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_output(output: &str) -> Result<Vec<BlockDevice>> {
    let parsed: LsblkOutput =
        serde_json::from_str(output).context("Failed to parse lsblk JSON output")?;
    Ok(parsed
        .blockdevices
        .into_iter()
        .map(BlockDevice::from)
        .filter(|dev| !dev.name.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        let output = r#"{
   "blockdevices": [
      {"name":"/dev/sda", "wwn":"0x5000c500a1b2c3d4", "vendor":"SEAGATE ", "model":"ST12000NM0008", "serial":"ZJV0A1B2", "size":"10.9T"},
      {"name":"/dev/nvme0n1", "wwn":"eui.0025385b71b0a1c2", "vendor":null, "model":"Samsung SSD 970", "serial":"S4EWNX0N", "size":"931.5G"},
      {"name":"/dev/zd0", "wwn":null, "vendor":null, "model":null, "serial":null, "size":"16G"}
   ]
}"#;

        let devices = parse_output(output).unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].name, "/dev/sda");
        assert_eq!(devices[0].vendor, "SEAGATE");
        assert_eq!(devices[0].wwn, "0x5000c500a1b2c3d4");
        assert_eq!(devices[1].vendor, "");
        assert_eq!(devices[2].serial, "");
        assert_eq!(devices[2].size, "16G");
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(parse_output("{}").unwrap().is_empty());
        assert!(parse_output("not json").is_err());
    }
}
