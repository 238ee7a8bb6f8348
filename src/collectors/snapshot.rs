use super::{Controller, ControllerFamily, LedAction};
use crate::domain::device::DeviceRecord;
use crate::domain::enclosure::Enclosure;
use crate::domain::topology::WwnMatching;
use crate::error::TopologyError;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Controller inventory captured to a file, for offline mapping and replay
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSnapshot {
    pub family: ControllerFamily,
    pub wwn_matching: Option<WwnMatching>,
    pub disks: Vec<DeviceRecord>,
    pub enclosures: Vec<Enclosure>,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self {
            family: ControllerFamily::Snapshot,
            wwn_matching: None,
            disks: Vec::new(),
            enclosures: Vec::new(),
        }
    }
}

impl ControllerSnapshot {
    /// JSON for `.json` files, YAML otherwise
    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let snapshot = if is_json {
            serde_json::from_str(contents)
                .with_context(|| format!("Failed to parse snapshot {}", path.display()))?
        } else {
            serde_yaml::from_str(contents)
                .with_context(|| format!("Failed to parse snapshot {}", path.display()))?
        };
        Ok(snapshot)
    }
}

pub struct SnapshotController {
    path: PathBuf,
    snapshot: ControllerSnapshot,
}

impl SnapshotController {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading controller snapshot from {}", path.display());
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot = ControllerSnapshot::parse(&contents, path)?;
        debug!(
            "Snapshot {}: family {}, {} disks, {} enclosures",
            path.display(),
            snapshot.family,
            snapshot.disks.len(),
            snapshot.enclosures.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            snapshot,
        })
    }
}

impl Controller for SnapshotController {
    fn family(&self) -> ControllerFamily {
        self.snapshot.family
    }

    fn wwn_matching(&self) -> WwnMatching {
        self.snapshot
            .wwn_matching
            .unwrap_or_else(|| self.snapshot.family.default_wwn_matching())
    }

    fn get_disks(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self.snapshot.disks.clone())
    }

    fn get_enclosures(&self) -> Result<Vec<Enclosure>> {
        Ok(self.snapshot.enclosures.clone())
    }

    fn locate(&self, _disk: &DeviceRecord, action: LedAction) -> Result<()> {
        Err(TopologyError::Unsupported {
            operation: format!("Turning LEDs {}", action),
            family: format!("snapshot {}", self.path.display()),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_snapshot() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
family: sas3ircu
disks:
  - serial: "ZL2LS892"
    wwn: "5000c500a1b2c3d4"
    controller: "0"
    enclosure: "2"
    slot: 4
enclosures:
  - controller_id: "0"
    enclosure_id: "2"
    logical_id: "500605b0:0a1b2c30"
    num_slots: 24
"#
        )
        .unwrap();

        let controller = SnapshotController::load(file.path()).unwrap();
        assert_eq!(controller.family(), ControllerFamily::Sas3Ircu);
        assert_eq!(controller.wwn_matching(), WwnMatching::TolerateOneDigit);

        let disks = controller.get_disks().unwrap();
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].slot, 4);
        assert_eq!(disks[0].model, "");

        let enclosures = controller.get_enclosures().unwrap();
        assert_eq!(enclosures[0].slots, 24);
        assert_eq!(enclosures[0].controller, "0");
        assert_eq!(enclosures[0].hw_start_slot, 1);
    }

    #[test]
    fn test_json_snapshot_defaults() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"disks": [{{"serial": "A1", "slot": 0}}]}}"#).unwrap();

        let controller = SnapshotController::load(file.path()).unwrap();
        assert_eq!(controller.family(), ControllerFamily::Snapshot);
        assert_eq!(controller.wwn_matching(), WwnMatching::Exact);
        assert!(controller.get_enclosures().unwrap().is_empty());
    }

    #[test]
    fn test_explicit_wwn_matching_wins() {
        let snapshot = ControllerSnapshot::parse(
            "family: sas2ircu\nwwn_matching: exact\n",
            Path::new("inventory.yml"),
        )
        .unwrap();
        assert_eq!(snapshot.wwn_matching, Some(WwnMatching::Exact));
    }

    #[test]
    fn test_locate_is_unsupported() {
        let controller = SnapshotController {
            path: PathBuf::from("inventory.yaml"),
            snapshot: ControllerSnapshot::default(),
        };
        let err = controller
            .locate(&DeviceRecord::default(), LedAction::On)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TopologyError>(),
            Some(TopologyError::Unsupported { .. })
        ));
    }
}
