//! VBox HTTP control API client

use std::time::Duration;
use tracing::{debug, trace};

use super::response;
use super::DeviceApi;
use crate::config::Settings;
use crate::error::Result;
use crate::models::{BoardInfo, Channel, Recording, SoftwareVersion, StorageInfo};
use crate::xmltv::{Guide, GuideParser, XmltvTime};

const CONTROL_PATH: &str = "/cgi-bin/HttpControl/";

pub struct VBoxClient {
    hostname: String,
    port: u16,
    agent: ureq::Agent,
}

impl VBoxClient {
    pub fn new(settings: &Settings) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(settings.timeout_secs)))
            .timeout_connect(Some(Duration::from_secs(settings.timeout_secs.min(30))))
            .build()
            .new_agent();

        Self {
            hostname: settings.hostname.clone(),
            port: settings.port,
            agent,
        }
    }

    pub(crate) fn base_url(&self) -> String {
        format!("http://{}:{}{}", self.hostname, self.port, CONTROL_PATH)
    }

    /// Perform a request and return the body once the device status is OK
    fn request(&self, method: &str, params: &[(&str, &str)]) -> Result<String> {
        debug!(method, "device request");

        let mut request = self.agent.get(self.base_url()).query("Method", method);
        for (key, value) in params {
            request = request.query(*key, *value);
        }

        let mut response = request.call()?;
        let body = response.body_mut().read_to_string()?;
        trace!(method, bytes = body.len(), "device response");

        response::check_status(&body)?;
        Ok(body)
    }
}

impl DeviceApi for VBoxClient {
    fn software_version(&self) -> Result<SoftwareVersion> {
        response::parse_software_version(&self.request("QuerySwVersion", &[])?)
    }

    fn board_info(&self) -> Result<BoardInfo> {
        Ok(response::parse_board_info(&self.request("QueryBoardInfo", &[])?))
    }

    fn external_storage(&self) -> Result<StorageInfo> {
        Ok(response::parse_storage(&self.request("QueryExternalStorage", &[])?))
    }

    fn channels(&self) -> Result<Vec<Channel>> {
        Ok(response::parse_channels(&self.request("GetXmltvChannelsList", &[])?))
    }

    fn guide(&self) -> Result<Guide> {
        Ok(GuideParser::parse(&self.request("GetXmltvSection", &[])?))
    }

    fn recordings(&self) -> Result<Vec<Recording>> {
        Ok(response::parse_recordings(
            &self.request("GetRecordsList", &[])?,
            chrono::Utc::now(),
        ))
    }

    fn schedule_timer(
        &self,
        channel_id: &str,
        title: &str,
        start: &XmltvTime,
        end: &XmltvTime,
    ) -> Result<()> {
        let start = start.to_string();
        let end = end.to_string();
        self.request(
            "ScheduleChannelRecord",
            &[
                ("ChannelID", channel_id),
                ("StartTime", &start),
                ("EndTime", &end),
                ("ProgramTitle", title),
            ],
        )?;
        Ok(())
    }

    fn delete_record(&self, id: u32) -> Result<()> {
        self.request("DeleteRecord", &[("RecordID", &id.to_string())])?;
        Ok(())
    }

    fn connection_string(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}
