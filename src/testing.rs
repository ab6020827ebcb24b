//! In-memory device used by the backend and host tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::device::DeviceApi;
use crate::error::{Error, Result};
use crate::models::{BoardInfo, Channel, Recording, RecordingState, SoftwareVersion, StorageInfo};
use crate::xmltv::{Guide, GuideParser, XmltvTime};

pub const DEVICE_GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="I1.1.vbox"><display-name>BBC ONE</display-name></channel>
  <channel id="I2.1.vbox"><display-name>ITV</display-name></channel>
  <programme channel="I1.1.vbox" start="20240115180000 +0000" stop="20240115183000 +0000">
    <title>News</title><desc>Evening news</desc>
  </programme>
  <programme channel="I1.1.vbox" start="20240115183000 +0000" stop="20240115190000 +0000">
    <title>Weather</title>
  </programme>
</tv>"#;

pub const EXTERNAL_GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="bbc1.uk"><display-name>BBC ONE</display-name></channel>
  <channel id="c4.uk"><display-name>Channel 4</display-name></channel>
  <programme channel="bbc1.uk" start="20240115200000 +0000" stop="20240115210000 +0000">
    <title>Drama</title><desc>A drama</desc>
  </programme>
</tv>"#;

pub fn channel(uid: u32, name: &str, xmltv_name: &str) -> Channel {
    Channel {
        uid,
        name: name.to_string(),
        number: uid,
        radio: false,
        encrypted: false,
        icon_url: String::new(),
        url: format!("http://vbox.local/live/{}", uid),
        xmltv_name: xmltv_name.to_string(),
    }
}

pub fn record(id: u32, channel_id: &str, title: &str, state: RecordingState) -> Recording {
    Recording::new(
        id,
        channel_id.to_string(),
        title.to_string(),
        1_705_341_600,
        1_705_345_200,
        format!("http://vbox.local/rec/{}.ts", id),
        state,
    )
}

#[derive(Debug, Clone)]
pub struct ScheduledTimer {
    pub channel_id: String,
    pub title: String,
    pub start: XmltvTime,
    pub end: XmltvTime,
}

pub struct FakeDevice {
    pub version: SoftwareVersion,
    pub reachable: bool,
    /// Number of upcoming version queries that fail as unreachable
    pub version_failures: AtomicUsize,
    pub version_queries: AtomicUsize,
    pub storage: StorageInfo,
    pub channels: Mutex<Vec<Channel>>,
    pub recordings: Mutex<Vec<Recording>>,
    pub reject_commands: bool,
    pub scheduled: Mutex<Vec<ScheduledTimer>>,
    pub deleted: Mutex<Vec<u32>>,
    pub channel_fetches: AtomicUsize,
    pub recording_fetches: AtomicUsize,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self {
            version: SoftwareVersion {
                major: 2,
                minor: 57,
                revision: 1,
            },
            reachable: true,
            version_failures: AtomicUsize::new(0),
            version_queries: AtomicUsize::new(0),
            storage: StorageInfo {
                present: true,
                total_mb: 1000,
                used_mb: 250,
            },
            channels: Mutex::new(vec![
                channel(1, "BBC ONE", "I1.1.vbox"),
                channel(2, "ITV", "I2.1.vbox"),
            ]),
            recordings: Mutex::new(vec![
                record(10, "I1.1.vbox", "Film", RecordingState::Recorded),
                record(11, "I2.1.vbox", "Quiz", RecordingState::Scheduled),
                record(12, "I9.9.vbox", "Orphan", RecordingState::Scheduled),
            ]),
            reject_commands: false,
            scheduled: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            channel_fetches: AtomicUsize::new(0),
            recording_fetches: AtomicUsize::new(0),
        }
    }
}

impl FakeDevice {
    fn connected(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(Error::ConnectionLost("connection refused".to_string()))
        }
    }

    pub fn command_count(&self) -> usize {
        self.scheduled.lock().unwrap().len() + self.deleted.lock().unwrap().len()
    }
}

impl DeviceApi for FakeDevice {
    fn software_version(&self) -> Result<SoftwareVersion> {
        self.version_queries.fetch_add(1, Ordering::SeqCst);
        let pending = self
            .version_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(Error::ConnectionLost("timed out".to_string()));
        }
        self.connected()?;
        Ok(self.version)
    }

    fn board_info(&self) -> Result<BoardInfo> {
        self.connected()?;
        Ok(BoardInfo {
            model: "VB-10".to_string(),
            serial: "0001".to_string(),
        })
    }

    fn external_storage(&self) -> Result<StorageInfo> {
        self.connected()?;
        Ok(self.storage)
    }

    fn channels(&self) -> Result<Vec<Channel>> {
        self.connected()?;
        self.channel_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.channels.lock().unwrap().clone())
    }

    fn guide(&self) -> Result<Guide> {
        self.connected()?;
        Ok(GuideParser::parse(DEVICE_GUIDE))
    }

    fn recordings(&self) -> Result<Vec<Recording>> {
        self.connected()?;
        self.recording_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.recordings.lock().unwrap().clone())
    }

    fn schedule_timer(
        &self,
        channel_id: &str,
        title: &str,
        start: &XmltvTime,
        end: &XmltvTime,
    ) -> Result<()> {
        self.connected()?;
        if self.reject_commands {
            return Err(Error::Backend("record conflict".to_string()));
        }
        self.scheduled.lock().unwrap().push(ScheduledTimer {
            channel_id: channel_id.to_string(),
            title: title.to_string(),
            start: *start,
            end: *end,
        });
        Ok(())
    }

    fn delete_record(&self, id: u32) -> Result<()> {
        self.connected()?;
        if self.reject_commands {
            return Err(Error::Backend(format!("no record {}", id)));
        }
        self.deleted.lock().unwrap().push(id);
        self.recordings.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    fn connection_string(&self) -> String {
        "vbox.local:80".to_string()
    }
}
