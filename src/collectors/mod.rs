pub mod command;
pub mod lsblk;
pub mod snapshot;
pub mod storcli;
pub mod zpool;

pub use lsblk::LsblkCollector;
pub use snapshot::{ControllerSnapshot, SnapshotController};
pub use storcli::StorcliController;
pub use zpool::ZpoolCollector;

use crate::domain::device::DeviceRecord;
use crate::domain::enclosure::Enclosure;
use crate::domain::topology::WwnMatching;
use crate::error::TopologyError;
use anyhow::Result;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerFamily {
    Storcli,
    #[serde(rename = "sas2ircu")]
    Sas2Ircu,
    #[serde(rename = "sas3ircu")]
    Sas3Ircu,
    Snapshot,
}

impl ControllerFamily {
    /// sas2ircu/sas3ircu report a GUID that can differ from the OS WWN in one digit
    pub fn default_wwn_matching(self) -> WwnMatching {
        match self {
            ControllerFamily::Sas2Ircu | ControllerFamily::Sas3Ircu => WwnMatching::TolerateOneDigit,
            ControllerFamily::Storcli | ControllerFamily::Snapshot => WwnMatching::Exact,
        }
    }
}

impl fmt::Display for ControllerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerFamily::Storcli => "storcli",
            ControllerFamily::Sas2Ircu => "sas2ircu",
            ControllerFamily::Sas3Ircu => "sas3ircu",
            ControllerFamily::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedAction {
    On,
    Off,
}

impl fmt::Display for LedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedAction::On => f.write_str("on"),
            LedAction::Off => f.write_str("off"),
        }
    }
}

/// A source of controller topology, one implementation per controller family
pub trait Controller {
    fn family(&self) -> ControllerFamily;

    /// WWN strictness to use when joining this source's records to block devices
    fn wwn_matching(&self) -> WwnMatching {
        self.family().default_wwn_matching()
    }

    fn get_disks(&self) -> Result<Vec<DeviceRecord>>;

    fn get_enclosures(&self) -> Result<Vec<Enclosure>>;

    /// Switch the identify LED of one drive bay
    fn locate(&self, disk: &DeviceRecord, action: LedAction) -> Result<()>;

    /// Switch the identify LED of every drive, returning (succeeded, failed)
    fn locate_all(&self, action: LedAction) -> Result<(usize, usize)> {
        let mut succeeded = 0;
        let mut failed = 0;
        for disk in self.get_disks()? {
            match self.locate(&disk, action) {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(
                        "Failed to turn {} LED for {}:{}:{}: {:#}",
                        action, disk.controller, disk.enclosure, disk.slot, e
                    );
                    failed += 1;
                }
            }
        }
        Ok((succeeded, failed))
    }
}

/// Collector output, or nothing when it failed; the run goes on with partial data
pub fn or_empty<T>(result: Result<Vec<T>>, what: &str) -> Vec<T> {
    result.unwrap_or_else(|e| {
        error!("Error collecting {}: {:#}", what, e);
        error!("Continuing without {}...", what);
        Vec::new()
    })
}

/// Pick the first controller family installed on this host
pub fn detect_controller() -> Result<Box<dyn Controller>> {
    info!("Detecting available controllers...");

    if let Some(storcli) = StorcliController::detect() {
        info!("Selected controller: storcli ({})", storcli.command());
        return Ok(Box::new(storcli));
    }

    debug!("No storcli controller responded");
    Err(TopologyError::ControllerUnavailable.into())
}
