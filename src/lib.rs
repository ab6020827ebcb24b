//! VBox PVR backend client
//!
//! Talks to a VBox TV gateway over its HTTP control API, keeps a snapshot of
//! channels and recordings, and reconciles the device guide with an
//! external XMLTV guide through a persisted channel map.

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod host;
pub mod mapper;
pub mod models;
pub mod startup;
pub mod util;
pub mod xmltv;

#[cfg(test)]
mod mapper_tests;
#[cfg(test)]
mod testing;

pub use backend::{Backend, RefreshSummary, Snapshot};
pub use config::Settings;
pub use device::{DeviceApi, VBoxClient};
pub use error::{Error, Result};
pub use host::{AddonStatus, Host, LogHost, PvrClient, PvrError};
pub use mapper::{ChannelMap, GuideChannelMapper};
pub use models::{Channel, Recording, RecordingState};
pub use startup::{StartupState, StartupStateHandler};
