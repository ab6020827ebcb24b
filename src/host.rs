//! Media-center facing adapter
//!
//! Translates backend data into the shapes the PVR host consumes and maps
//! backend errors onto host result codes. Holds no state of its own beyond
//! the startup status.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::device::DeviceApi;
use crate::error::Error;
use crate::models::RecordingState;

/// Encryption system reported for encrypted channels
const ENCRYPTION_UNKNOWN: u32 = 0xFFFF;
const TV_INPUT_FORMAT: &str = "video/mp2t";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonStatus {
    Ok,
    LostConnection,
    PermanentFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PvrError {
    #[error("operation failed")]
    Failed,
    #[error("invalid parameters")]
    InvalidParameters,
    #[error("server error")]
    ServerError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Callbacks into the media-center host
pub trait Host: Send + Sync {
    fn queue_notification(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Info => info!(message, "notification"),
            NotificationLevel::Warning => warn!(message, "notification"),
            NotificationLevel::Error => error!(message, "notification"),
        }
    }

    fn trigger_timer_update(&self) {
        debug!("timer update requested");
    }

    fn trigger_recording_update(&self) {
        debug!("recording update requested");
    }

    fn trigger_channel_update(&self) {
        debug!("channel update requested");
    }
}

/// Host that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHost;

impl Host for LogHost {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_tv: bool,
    pub supports_radio: bool,
    pub supports_epg: bool,
    pub supports_recordings: bool,
    pub supports_timers: bool,
    pub supports_channel_groups: bool,
    pub handles_input_stream: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvrChannel {
    pub unique_id: u32,
    pub is_radio: bool,
    pub channel_number: u32,
    pub encryption_system: u32,
    pub name: String,
    pub icon_path: String,
    pub stream_url: String,
    pub input_format: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvrRecording {
    pub recording_id: String,
    pub title: String,
    pub channel_name: String,
    pub recording_time: i64,
    pub duration: i64,
    pub stream_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Scheduled,
    Recording,
    Completed,
}

impl From<RecordingState> for TimerState {
    fn from(state: RecordingState) -> Self {
        match state {
            RecordingState::Scheduled => TimerState::Scheduled,
            RecordingState::Recording => TimerState::Recording,
            RecordingState::Recorded | RecordingState::External => TimerState::Completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvrTimer {
    pub client_index: u32,
    /// `None` when the timer's channel cannot be matched to a known channel
    pub client_channel_uid: Option<u32>,
    pub start_time: i64,
    pub end_time: i64,
    pub state: TimerState,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpgTag {
    pub unique_broadcast_id: u32,
    pub channel_number: u32,
    pub start_time: i64,
    pub end_time: i64,
    pub title: String,
    pub plot: String,
    pub genre: Option<String>,
}

pub struct PvrClient<D: DeviceApi, H: Host = LogHost> {
    backend: Arc<Backend<D>>,
    host: H,
    status: AddonStatus,
}

impl<D: DeviceApi, H: Host> PvrClient<D, H> {
    /// Run backend startup and derive the addon status from its outcome
    pub fn create(backend: Arc<Backend<D>>, host: H) -> Self {
        let status = match backend.initialize() {
            Ok(()) => AddonStatus::Ok,
            Err(e @ Error::FirmwareIncompatible { .. }) => {
                host.queue_notification(NotificationLevel::Error, &e.to_string());
                AddonStatus::PermanentFailure
            }
            Err(e) => {
                error!(error = %e, "backend startup failed");
                AddonStatus::LostConnection
            }
        };

        Self { backend, host, status }
    }

    pub fn status(&self) -> AddonStatus {
        self.status
    }

    pub fn backend(&self) -> &Arc<Backend<D>> {
        &self.backend
    }

    /// Recording support is only advertised once startup has settled
    /// within `timeout` and storage is attached.
    pub fn capabilities(&self, timeout: Duration) -> Capabilities {
        let recordings = self.backend.supports_recordings(timeout);
        Capabilities {
            supports_tv: true,
            supports_radio: true,
            supports_epg: true,
            supports_recordings: recordings,
            supports_timers: recordings,
            ..Capabilities::default()
        }
    }

    pub fn backend_name(&self) -> String {
        self.backend.backend_name()
    }

    pub fn backend_version(&self) -> String {
        self.backend.backend_version()
    }

    pub fn backend_hostname(&self) -> String {
        self.backend.backend_hostname()
    }

    pub fn connection_string(&self) -> String {
        self.backend.connection_string()
    }

    /// Total and used recording space in KB
    pub fn drive_space(&self) -> (u64, u64) {
        (
            self.backend.recording_total_space(),
            self.backend.recording_used_space(),
        )
    }

    pub fn channels_amount(&self) -> usize {
        self.backend.channels_amount()
    }

    pub fn channels(&self, radio: bool) -> Vec<PvrChannel> {
        self.backend
            .snapshot()
            .channels()
            .iter()
            .filter(|c| c.radio == radio)
            .map(|c| PvrChannel {
                unique_id: c.uid,
                is_radio: c.radio,
                channel_number: c.number,
                encryption_system: if c.encrypted { ENCRYPTION_UNKNOWN } else { 0 },
                name: c.name.clone(),
                icon_path: c.icon_url.clone(),
                stream_url: c.url.clone(),
                input_format: if c.radio {
                    String::new()
                } else {
                    TV_INPUT_FORMAT.to_string()
                },
            })
            .collect()
    }

    pub fn recordings_amount(&self) -> usize {
        self.backend.recordings_amount()
    }

    pub fn recordings(&self) -> Vec<PvrRecording> {
        self.backend
            .snapshot()
            .recordings()
            .map(|r| PvrRecording {
                recording_id: r.id.to_string(),
                title: r.title.clone(),
                channel_name: r.channel_name.clone(),
                recording_time: r.start,
                duration: r.duration_secs(),
                stream_url: r.url.clone(),
            })
            .collect()
    }

    pub fn delete_recording(&self, recording_id: &str) -> Result<(), PvrError> {
        let id: u32 = recording_id.trim().parse().map_err(|_| {
            warn!(recording_id, "invalid recording id");
            PvrError::InvalidParameters
        })?;

        if self.backend.delete_recording_or_timer(id) {
            Ok(())
        } else {
            Err(PvrError::Failed)
        }
    }

    pub fn timers_amount(&self) -> usize {
        self.backend.timers_amount()
    }

    pub fn timers(&self) -> Vec<PvrTimer> {
        let snapshot = self.backend.snapshot();
        snapshot
            .timers()
            .map(|t| PvrTimer {
                client_index: t.id,
                client_channel_uid: snapshot.channel_by_xmltv_name(&t.channel_id).map(|c| c.uid),
                start_time: t.start,
                end_time: t.end,
                state: t.state().into(),
                title: t.title.clone(),
            })
            .collect()
    }

    pub fn add_timer(&self, channel_uid: u32, epg_uid: u32) -> Result<(), PvrError> {
        match self.backend.add_timer(channel_uid, epg_uid) {
            Ok(()) => {
                self.host.trigger_timer_update();
                Ok(())
            }
            Err(Error::InvalidParameters(msg)) => {
                warn!(channel_uid, epg_uid, reason = %msg, "cannot add timer");
                Err(PvrError::InvalidParameters)
            }
            Err(e) => {
                error!(channel_uid, epg_uid, error = %e, "failed to add timer");
                Err(PvrError::Failed)
            }
        }
    }

    pub fn delete_timer(&self, client_index: u32) -> Result<(), PvrError> {
        if self.backend.delete_recording_or_timer(client_index) {
            Ok(())
        } else {
            Err(PvrError::Failed)
        }
    }

    /// Programmes of a channel that overlap `[start, end)`, including the
    /// one already on air at `start`
    pub fn epg_for_channel(&self, channel_uid: u32, start: i64, end: i64) -> Result<Vec<EpgTag>, PvrError> {
        let channel = self.backend.get_channel(channel_uid).map_err(|e| {
            error!(channel_uid, error = %e, "EPG requested for unknown channel");
            PvrError::Failed
        })?;

        let Some(schedule) = self.backend.get_schedule(&channel) else {
            debug!(channel = %channel.name, "no EPG data for channel");
            return Ok(Vec::new());
        };

        Ok(schedule
            .iter()
            .filter(|p| p.end.to_unix() > start && p.start.to_unix() < end)
            .map(|p| EpgTag {
                unique_broadcast_id: p.unique_id(),
                channel_number: channel.number,
                start_time: p.start.to_unix(),
                end_time: p.end.to_unix(),
                title: p.title.clone(),
                plot: p.description.clone(),
                genre: p.category.clone(),
            })
            .collect())
    }
}
