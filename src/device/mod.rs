//! Device command interface
//!
//! [`DeviceApi`] is the seam between the backend and the gateway;
//! [`VBoxClient`] implements it over the HTTP control API.

mod client;
mod response;

pub use client::VBoxClient;

use crate::error::Result;
use crate::models::{BoardInfo, Channel, Recording, SoftwareVersion, StorageInfo};
use crate::xmltv::{Guide, XmltvTime};

/// Commands and queries the backend issues to the device
pub trait DeviceApi: Send + Sync {
    fn software_version(&self) -> Result<SoftwareVersion>;

    fn board_info(&self) -> Result<BoardInfo>;

    fn external_storage(&self) -> Result<StorageInfo>;

    fn channels(&self) -> Result<Vec<Channel>>;

    /// The device's own XMLTV guide
    fn guide(&self) -> Result<Guide>;

    /// Recordings and timers, already classified
    fn recordings(&self) -> Result<Vec<Recording>>;

    fn schedule_timer(
        &self,
        channel_id: &str,
        title: &str,
        start: &XmltvTime,
        end: &XmltvTime,
    ) -> Result<()>;

    /// Delete a recording or cancel a timer; both share one id space
    fn delete_record(&self, id: u32) -> Result<()>;

    /// Address used for user-facing connection strings
    fn connection_string(&self) -> String;
}
