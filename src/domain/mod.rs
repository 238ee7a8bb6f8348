pub mod device;
pub mod enclosure;
pub mod location;
pub mod overlay;
pub mod topology;

pub use device::{normalize_wwn, BlockDevice, DeviceRecord, Disk};
pub use enclosure::{Enclosure, EnclosureConfig, EnclosureRegistry};
pub use location::{
    location_updates, rewrite_location_tag, sort_for_presentation, Location, LocationMapper,
    LocationUpdate, LogicalNumbering,
};
pub use overlay::{DiskMapping, DiskMappings};
pub use topology::{DeviceMatcher, WwnMatching};
