use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("No supported storage controller found")]
    ControllerUnavailable,

    #[error("Command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("{operation} is not supported by the {family} source")]
    Unsupported { operation: String, family: String },
}

pub type Result<T> = std::result::Result<T, TopologyError>;
