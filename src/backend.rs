//! Backend facade
//!
//! [`Backend`] is the context object the host glue talks to. It owns the
//! current snapshot of channels and recordings, the guides and the channel
//! mapper, and dispatches commands to the device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::device::DeviceApi;
use crate::error::{Error, Result};
use crate::mapper::{ChannelMap, GuideChannelMapper};
use crate::models::{BoardInfo, Channel, Recording, SoftwareVersion, StorageInfo};
use crate::startup::{StartupFailure, StartupState, StartupStateHandler};
use crate::util::eq_by_key;
use crate::xmltv::{self, Guide, Programme, Schedule};

/// Channels and recordings as of the last refresh. Never mutated once
/// published; a refresh swaps in a new one.
#[derive(Debug, Default)]
pub struct Snapshot {
    channels: Vec<Channel>,
    by_uid: HashMap<u32, usize>,
    by_xmltv_name: HashMap<String, usize>,
    recordings: Vec<Recording>,
}

impl Snapshot {
    fn new(channels: Vec<Channel>, recordings: Vec<Recording>) -> Self {
        let mut by_uid = HashMap::with_capacity(channels.len());
        let mut by_xmltv_name = HashMap::with_capacity(channels.len());
        for (i, channel) in channels.iter().enumerate() {
            if by_uid.insert(channel.uid, i).is_some() {
                warn!(uid = channel.uid, name = %channel.name, "duplicate channel uid");
            }
            by_xmltv_name.entry(channel.xmltv_name.clone()).or_insert(i);
        }

        let mut snapshot = Self {
            channels,
            by_uid,
            by_xmltv_name,
            recordings: Vec::new(),
        };
        snapshot.recordings = recordings
            .into_iter()
            .map(|rec| match snapshot.channel_by_xmltv_name(&rec.channel_id) {
                Some(channel) => {
                    let name = channel.name.clone();
                    rec.with_channel_name(name)
                }
                None => rec,
            })
            .collect();
        snapshot
    }

    /// Channels in device order
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, uid: u32) -> Option<&Channel> {
        self.by_uid.get(&uid).map(|&i| &self.channels[i])
    }

    pub fn channel_by_xmltv_name(&self, xmltv_name: &str) -> Option<&Channel> {
        self.by_xmltv_name.get(xmltv_name).map(|&i| &self.channels[i])
    }

    /// Recordings and timers together, as the device lists them
    pub fn recordings_and_timers(&self) -> &[Recording] {
        &self.recordings
    }

    pub fn recordings(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.iter().filter(|r| r.is_recording())
    }

    pub fn timers(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.iter().filter(|r| r.is_timer())
    }
}

#[derive(Debug, Default)]
struct Guides {
    device: Guide,
    external: Option<Guide>,
}

#[derive(Debug, Default, Clone)]
struct DeviceInfo {
    version: Option<SoftwareVersion>,
    board: BoardInfo,
    storage: StorageInfo,
}

/// What a refresh changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub channels_changed: bool,
    pub recordings_changed: bool,
}

/// Clears the refresh flag when the refresh ends, however it ends
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Backend<D: DeviceApi> {
    settings: Settings,
    device: D,
    state: StartupStateHandler,
    info: RwLock<DeviceInfo>,
    snapshot: RwLock<Arc<Snapshot>>,
    guides: RwLock<Arc<Guides>>,
    mapper: Mutex<Option<GuideChannelMapper>>,
    refreshing: AtomicBool,
}

impl<D: DeviceApi + 'static> Backend<D> {
    /// Run the startup sequence on its own thread
    pub fn start(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let backend = Arc::clone(self);
        std::thread::spawn(move || backend.initialize())
    }
}

impl<D: DeviceApi> Backend<D> {
    pub fn new(settings: Settings, device: D) -> Self {
        Self {
            settings,
            device,
            state: StartupStateHandler::new(),
            info: RwLock::new(DeviceInfo::default()),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            guides: RwLock::new(Arc::new(Guides::default())),
            mapper: Mutex::new(None),
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn state_handler(&self) -> &StartupStateHandler {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Probe the device, fetch the initial data and set up guide mapping.
    ///
    /// Firmware incompatibility fails with [`Error::FirmwareIncompatible`];
    /// any other failure is reported as [`Error::ConnectionLost`]. Startup
    /// runs once: after a failure every further call returns that failure,
    /// and after success further calls return `Ok` without touching the
    /// device.
    pub fn initialize(&self) -> Result<()> {
        if !self.state.advance(StartupState::ProbingFirmware) {
            return match self.state.state() {
                StartupState::Initialized => {
                    debug!("backend already initialized");
                    Ok(())
                }
                StartupState::Failed => Err(self.startup_error()),
                _ => Err(Error::Backend("startup already in progress".to_string())),
            };
        }
        info!(host = %self.settings.hostname, port = self.settings.port, "initializing VBox backend");

        match self.run_startup() {
            Ok(()) if self.state.advance(StartupState::Initialized) => {
                info!("VBox backend initialized");
                Ok(())
            }
            Ok(()) => Err(self.startup_error()),
            Err(e) => {
                let (failure, err) = match e {
                    Error::FirmwareIncompatible { ref found, .. } => {
                        (StartupFailure::FirmwareIncompatible(found.clone()), e)
                    }
                    Error::ConnectionLost(ref msg) => (StartupFailure::ConnectionLost(msg.clone()), e),
                    other => {
                        let msg = other.to_string();
                        (StartupFailure::ConnectionLost(msg.clone()), Error::ConnectionLost(msg))
                    }
                };
                self.state.fail(failure);
                Err(err)
            }
        }
    }

    /// The recorded startup failure as an error
    fn startup_error(&self) -> Error {
        match self.state.failure() {
            Some(StartupFailure::FirmwareIncompatible(found)) => Error::FirmwareIncompatible {
                found,
                required: SoftwareVersion::MINIMUM.to_string(),
            },
            Some(StartupFailure::ConnectionLost(msg)) => Error::ConnectionLost(msg),
            None => Error::ConnectionLost("startup did not complete".to_string()),
        }
    }

    fn run_startup(&self) -> Result<()> {
        let version = self.device.software_version()?;
        if !version.is_supported() {
            return Err(Error::FirmwareIncompatible {
                found: version.to_string(),
                required: SoftwareVersion::MINIMUM.to_string(),
            });
        }
        debug!(%version, "firmware is supported");

        let board = self.device.board_info()?;
        let storage = self.device.external_storage()?;
        *write(&self.info) = DeviceInfo {
            version: Some(version),
            board,
            storage,
        };

        self.refresh()?;

        let device_guide = self.device.guide()?;
        let external_guide = self.load_external_guide();

        if let Some(ref external) = external_guide {
            let mut mapper = GuideChannelMapper::new(self.settings.channel_map_path());
            mapper.initialize(&device_guide, external);
            *self.lock_mapper() = Some(mapper);
        }

        *write(&self.guides) = Arc::new(Guides {
            device: device_guide,
            external: external_guide,
        });
        Ok(())
    }

    /// A broken external guide degrades to "no external guide"
    fn load_external_guide(&self) -> Option<Guide> {
        if !self.settings.use_external_guide() {
            return None;
        }

        match xmltv::load_guide(self.settings.external_xmltv.trim()) {
            Ok(guide) => {
                info!(
                    channels = guide.channels().len(),
                    programmes = guide.programme_count(),
                    "external guide loaded"
                );
                Some(guide)
            }
            Err(e) => {
                warn!(source = %self.settings.external_xmltv, error = %e, "external guide unavailable");
                None
            }
        }
    }

    fn lock_mapper(&self) -> MutexGuard<'_, Option<GuideChannelMapper>> {
        self.mapper.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Re-fetch channels and recordings and publish them as a new snapshot.
    ///
    /// Returns `None` without touching the device when another refresh is
    /// already running.
    pub fn refresh(&self) -> Result<Option<RefreshSummary>> {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            debug!("refresh already in progress");
            return Ok(None);
        };

        let channels = self.device.channels()?;
        let recordings = self.device.recordings()?;
        Ok(Some(self.publish(channels, recordings)))
    }

    /// Re-fetch only recordings and timers
    pub fn refresh_recordings(&self) -> Result<Option<RefreshSummary>> {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            debug!("refresh already in progress");
            return Ok(None);
        };

        let recordings = self.device.recordings()?;
        let channels = self.snapshot().channels().to_vec();
        Ok(Some(self.publish(channels, recordings)))
    }

    fn publish(&self, channels: Vec<Channel>, recordings: Vec<Recording>) -> RefreshSummary {
        let next = Arc::new(Snapshot::new(channels, recordings));
        let mut current = write(&self.snapshot);

        let summary = RefreshSummary {
            channels_changed: !eq_by_key(current.channels(), next.channels(), |c| c.clone()),
            recordings_changed: !eq_by_key(
                current.recordings_and_timers(),
                next.recordings_and_timers(),
                |r| (r.id, r.state(), r.start, r.end, r.title.clone()),
            ),
        };
        debug!(
            channels = next.channels().len(),
            recordings = next.recordings_and_timers().len(),
            ?summary,
            "snapshot refreshed"
        );

        *current = next;
        summary
    }

    /// The current snapshot; stays valid and unchanged while held
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&read(&self.snapshot))
    }

    pub fn get_channels(&self) -> Vec<Channel> {
        self.snapshot().channels().to_vec()
    }

    pub fn get_channel(&self, uid: u32) -> Result<Channel> {
        self.snapshot()
            .channel(uid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("channel {}", uid)))
    }

    pub fn get_recordings_and_timers(&self) -> Vec<Recording> {
        self.snapshot().recordings_and_timers().to_vec()
    }

    /// Channel uid a timer was set on, if its channel identity is known
    pub fn timer_channel_uid(&self, timer: &Recording) -> Option<u32> {
        self.snapshot()
            .channel_by_xmltv_name(&timer.channel_id)
            .map(|c| c.uid)
    }

    /// Schedule of a channel, or `None` when no guide data is available for
    /// it (unmapped channel, or the guide does not list it).
    pub fn get_schedule(&self, channel: &Channel) -> Option<Schedule> {
        let guides = Arc::clone(&read(&self.guides));

        match guides.external {
            Some(ref external) => {
                let mapper = self.lock_mapper();
                let external_name = mapper.as_ref()?.external_channel_name(&channel.name);
                if external_name.is_empty() {
                    debug!(channel = %channel.name, "channel has no external guide mapping");
                    return None;
                }
                let channel_id = external.channel_id(external_name)?;
                external.schedule(channel_id).cloned()
            }
            None => guides.device.schedule(&channel.xmltv_name).cloned(),
        }
    }

    /// Find a programme in any guide by its unique id
    pub fn get_programme(&self, uid: u32) -> Option<Programme> {
        let guides = Arc::clone(&read(&self.guides));
        guides
            .external
            .as_ref()
            .and_then(|g| g.programme(uid))
            .or_else(|| guides.device.programme(uid))
            .cloned()
    }

    /// Schedule a recording of `programme_uid` on `channel_uid`
    pub fn add_timer(&self, channel_uid: u32, programme_uid: u32) -> Result<()> {
        let channel = self
            .snapshot()
            .channel(channel_uid)
            .cloned()
            .ok_or_else(|| Error::InvalidParameters(format!("unknown channel {}", channel_uid)))?;
        let programme = self
            .get_programme(programme_uid)
            .ok_or_else(|| Error::InvalidParameters(format!("unknown programme {}", programme_uid)))?;

        info!(channel = %channel.name, title = %programme.title, "adding timer");
        self.device
            .schedule_timer(&channel.xmltv_name, &programme.title, &programme.start, &programme.end)
            .map_err(|e| match e {
                Error::Backend(_) => e,
                other => Error::Backend(other.to_string()),
            })?;

        self.refresh_after_command();
        Ok(())
    }

    /// Delete a recording or cancel a timer. Failures are logged.
    pub fn delete_recording_or_timer(&self, id: u32) -> bool {
        match self.device.delete_record(id) {
            Ok(()) => {
                info!(id, "recording/timer deleted");
                self.refresh_after_command();
                true
            }
            Err(e) => {
                error!(id, error = %e, "failed to delete recording/timer");
                false
            }
        }
    }

    fn refresh_after_command(&self) {
        if let Err(e) = self.refresh_recordings() {
            warn!(error = %e, "could not refresh recordings after command");
        }
    }

    /// Whether recordings can be made. Waits up to `timeout` for startup,
    /// since storage is unknown before then.
    pub fn supports_recordings(&self, timeout: Duration) -> bool {
        self.state.wait_for_state(StartupState::Initialized, timeout) && read(&self.info).storage.present
    }

    pub fn channel_map(&self) -> Option<ChannelMap> {
        self.lock_mapper().as_ref().map(|m| m.mappings().clone())
    }

    /// Persist a new channel map and make it active
    pub fn replace_channel_map(&self, map: &ChannelMap) -> Result<()> {
        match self.lock_mapper().as_mut() {
            Some(mapper) => mapper.replace(map),
            None => Err(Error::NotFound("no external guide configured".to_string())),
        }
    }

    pub fn channels_amount(&self) -> usize {
        self.snapshot().channels().len()
    }

    pub fn recordings_amount(&self) -> usize {
        self.snapshot().recordings().count()
    }

    pub fn timers_amount(&self) -> usize {
        self.snapshot().timers().count()
    }

    pub fn backend_name(&self) -> String {
        let board = read(&self.info).board.clone();
        if board.model.is_empty() {
            "VBox TV Gateway".to_string()
        } else {
            format!("VBox TV Gateway ({})", board.model)
        }
    }

    pub fn backend_version(&self) -> String {
        read(&self.info)
            .version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn backend_hostname(&self) -> String {
        self.settings.hostname.clone()
    }

    pub fn connection_string(&self) -> String {
        self.device.connection_string()
    }

    /// Recording storage size in KB
    pub fn recording_total_space(&self) -> u64 {
        read(&self.info).storage.total_mb.saturating_mul(1024)
    }

    /// Used recording storage in KB
    pub fn recording_used_space(&self) -> u64 {
        read(&self.info).storage.used_mb.saturating_mul(1024)
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
