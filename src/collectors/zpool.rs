use super::command;
use crate::domain::device::Disk;
use anyhow::{Context, Result};
use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Raw `zpool status` output with device paths resolved
pub struct ZpoolCollector;

impl ZpoolCollector {
    pub fn new() -> Self {
        Self
    }

    pub fn collect(&self) -> Result<String> {
        command::run("zpool", &["status", "-LP"]).context("Failed to get ZFS pool status")
    }
}

impl Default for ZpoolCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn partition_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // nvme0n1p1, mmcblk0p2
            Regex::new(r"^(.*\d)p\d+$").expect("partition pattern is valid"),
            // sda1, vdb12
            Regex::new(r"^(.*\D)\d+$").expect("partition pattern is valid"),
        ]
    })
}

/// Whole-disk device for a partition path, or `None` if it does not look like one
pub fn whole_disk(dev: &str) -> Option<&str> {
    partition_patterns()
        .iter()
        .find_map(|re| re.captures(dev))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Append location and serial to every vdev line naming a located disk.
///
/// Lines are matched by device path first, then by the whole disk of a partition.
/// Everything else passes through unchanged.
pub fn annotate_status(status: &str, disks: &[Disk]) -> String {
    let by_name: HashMap<&str, &Disk> = disks
        .iter()
        .filter(|d| d.is_located())
        .map(|d| (d.dev_name.as_str(), d))
        .collect();

    let mut annotated = Vec::new();
    for line in status.lines() {
        let Some(dev) = line.split_whitespace().next().filter(|t| t.starts_with("/dev/")) else {
            annotated.push(line.to_string());
            continue;
        };

        let disk = by_name
            .get(dev)
            .or_else(|| whole_disk(dev).and_then(|whole| by_name.get(whole)));
        match disk {
            Some(disk) => {
                annotated.push(format!(
                    "{}  {} (S/N: {})",
                    line.trim_end(),
                    disk.location(),
                    disk.serial
                ));
            }
            None => {
                debug!("No located disk for pool member {}", dev);
                annotated.push(line.to_string());
            }
        }
    }
    annotated.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(dev_name: &str, serial: &str, slot: i64) -> Disk {
        Disk {
            dev_name: dev_name.to_string(),
            serial: serial.to_string(),
            matched: true,
            enclosure_name: "Front JBOD".to_string(),
            physical_slot: slot,
            logical_disk: slot,
            ..Default::default()
        }
    }

    #[test]
    fn test_whole_disk() {
        assert_eq!(whole_disk("/dev/sda1"), Some("/dev/sda"));
        assert_eq!(whole_disk("/dev/sdab12"), Some("/dev/sdab"));
        assert_eq!(whole_disk("/dev/nvme0n1p3"), Some("/dev/nvme0n1"));
        assert_eq!(whole_disk("/dev/mmcblk0p1"), Some("/dev/mmcblk0"));
        assert_eq!(whole_disk("/dev/sda"), None);
    }

    #[test]
    fn test_annotate_status() {
        let status = "  pool: tank
 state: ONLINE
config:

\tNAME                STATE     READ WRITE CKSUM
\ttank                ONLINE       0     0     0
\t  raidz2-0          ONLINE       0     0     0
\t    /dev/sda1       ONLINE       0     0     0
\t    /dev/nvme0n1p1  ONLINE       0     0     0
\t    /dev/dm-3       ONLINE       0     0     0
\t    /dev/sdz1       ONLINE       0     0     0

errors: No known data errors";

        let disks = vec![
            located("/dev/sda", "ZL2LS892", 1),
            located("/dev/nvme0n1", "S4EWNX0N", 2),
            located("/dev/dm-3", "ZJV0A1B2", 3),
            Disk {
                dev_name: "/dev/sdz".to_string(),
                serial: "UNLOCATED".to_string(),
                ..Default::default()
            },
        ];

        let annotated = annotate_status(status, &disks);
        let lines: Vec<&str> = annotated.lines().collect();
        assert_eq!(lines.len(), status.lines().count());
        assert_eq!(lines[0], "  pool: tank");
        assert_eq!(lines[5], "\ttank                ONLINE       0     0     0");
        assert_eq!(
            lines[7],
            "\t    /dev/sda1       ONLINE       0     0     0  Front JBOD;SLOT:1;DISK:1 (S/N: ZL2LS892)"
        );
        assert!(lines[8].ends_with("Front JBOD;SLOT:2;DISK:2 (S/N: S4EWNX0N)"));
        assert!(lines[9].ends_with("Front JBOD;SLOT:3;DISK:3 (S/N: ZJV0A1B2)"));
        assert_eq!(lines[10], "\t    /dev/sdz1       ONLINE       0     0     0");
    }

    #[test]
    fn test_annotate_without_disks_is_unchanged() {
        let status = "\t    /dev/sda1  ONLINE  0 0 0";
        assert_eq!(annotate_status(status, &[]), status);
    }
}
