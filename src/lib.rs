pub mod collectors;
pub mod config;
pub mod domain;
pub mod error;

pub use error::TopologyError;
