//! Data models for channels, recordings and timers

use chrono::{DateTime, Utc};

/// A channel as reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Unique id derived from the device channel number; stable across refreshes
    pub uid: u32,
    pub name: String,
    pub number: u32,
    pub radio: bool,
    pub encrypted: bool,
    pub icon_url: String,
    pub url: String,
    /// Channel identity used by the device guide, timers and recordings
    pub xmltv_name: String,
}

/// Classification of a recording/timer item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingState {
    /// Future timer, not yet recording
    Scheduled,
    /// Currently being recorded
    Recording,
    /// Completed and stored on the device
    Recorded,
    /// Completed, stored outside the device but reported by it
    External,
}

impl RecordingState {
    /// Classify a device record from its reported state and targets.
    ///
    /// `now` is only consulted when the state text is not recognised.
    pub fn classify(
        state: &str,
        has_local_target: bool,
        has_external_target: bool,
        start: i64,
        end: i64,
        now: DateTime<Utc>,
    ) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "scheduled" => RecordingState::Scheduled,
            "recording" => RecordingState::Recording,
            "recorded" | "finished" => {
                if !has_local_target && has_external_target {
                    RecordingState::External
                } else {
                    RecordingState::Recorded
                }
            }
            "external" => RecordingState::External,
            _ => {
                let now = now.timestamp();
                if end <= now {
                    RecordingState::Recorded
                } else if start <= now {
                    RecordingState::Recording
                } else {
                    RecordingState::Scheduled
                }
            }
        }
    }

    pub fn is_timer(self) -> bool {
        matches!(self, RecordingState::Scheduled | RecordingState::Recording)
    }

    pub fn is_recording(self) -> bool {
        !self.is_timer()
    }
}

/// A recording or a timer; the device lists both together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    /// Device-assigned id, shared namespace for recordings and timers
    pub id: u32,
    /// Channel identity as reported by the device (matches `Channel::xmltv_name`)
    pub channel_id: String,
    /// Display name of the channel, or the raw identity when it is unknown
    pub channel_name: String,
    pub title: String,
    /// Start time as Unix timestamp
    pub start: i64,
    /// End time as Unix timestamp
    pub end: i64,
    /// Stream URL, only set for recordings
    pub url: String,
    state: RecordingState,
}

impl Recording {
    pub fn new(
        id: u32,
        channel_id: String,
        title: String,
        start: i64,
        end: i64,
        url: String,
        state: RecordingState,
    ) -> Self {
        let url = if state.is_recording() { url } else { String::new() };
        Self {
            id,
            channel_name: channel_id.clone(),
            channel_id,
            title,
            start,
            end,
            url,
            state,
        }
    }

    pub fn with_channel_name(mut self, channel_name: String) -> Self {
        self.channel_name = channel_name;
        self
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_timer(&self) -> bool {
        self.state.is_timer()
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    pub fn duration_secs(&self) -> i64 {
        self.end - self.start
    }
}

/// Software version of the device firmware, compared numerically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SoftwareVersion {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
}

impl SoftwareVersion {
    pub const MINIMUM: SoftwareVersion = SoftwareVersion {
        major: 2,
        minor: 46,
        revision: 20,
    };

    /// Parse "2.46.20" or a prefixed form such as "VB.2.47.1"
    pub fn parse(s: &str) -> Option<Self> {
        let mut numbers = s
            .split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u32>());

        let major = numbers.next()?.ok()?;
        let minor = numbers.next().unwrap_or(Ok(0)).ok()?;
        let revision = numbers.next().unwrap_or(Ok(0)).ok()?;
        Some(Self {
            major,
            minor,
            revision,
        })
    }

    pub fn is_supported(&self) -> bool {
        *self >= Self::MINIMUM
    }
}

impl std::fmt::Display for SoftwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// Board information reported by the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardInfo {
    pub model: String,
    pub serial: String,
}

/// External storage report; recordings need attached storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageInfo {
    pub present: bool,
    /// Total space in MB
    pub total_mb: u64,
    /// Used space in MB
    pub used_mb: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ALL_STATES: [RecordingState; 4] = [
        RecordingState::Scheduled,
        RecordingState::Recording,
        RecordingState::Recorded,
        RecordingState::External,
    ];

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_000_000, 0).unwrap()
    }

    #[test]
    fn test_timer_and_recording_partition_states() {
        for state in ALL_STATES {
            assert_ne!(state.is_timer(), state.is_recording(), "{:?}", state);
        }
        assert!(RecordingState::Scheduled.is_timer());
        assert!(RecordingState::Recording.is_timer());
        assert!(RecordingState::Recorded.is_recording());
        assert!(RecordingState::External.is_recording());
    }

    #[test]
    fn test_classify_reported_states() {
        let c = |state, local, external| RecordingState::classify(state, local, external, 0, 10, now());
        assert_eq!(c("Scheduled", false, false), RecordingState::Scheduled);
        assert_eq!(c("recording", true, false), RecordingState::Recording);
        assert_eq!(c("Recorded", true, false), RecordingState::Recorded);
        assert_eq!(c("Recorded", true, true), RecordingState::Recorded);
        assert_eq!(c("Recorded", false, true), RecordingState::External);
        assert_eq!(c("Recorded", false, false), RecordingState::Recorded);
        assert_eq!(c("external", false, true), RecordingState::External);
    }

    #[test]
    fn test_classify_unknown_state_uses_clock() {
        let c = |start, end| RecordingState::classify("Error", false, false, start, end, now());
        assert_eq!(c(0, 500_000), RecordingState::Recorded);
        assert_eq!(c(900_000, 1_100_000), RecordingState::Recording);
        assert_eq!(c(2_000_000, 2_100_000), RecordingState::Scheduled);
    }

    #[test]
    fn test_timer_drops_url() {
        let timer = Recording::new(
            1,
            "ch1".to_string(),
            "Show".to_string(),
            0,
            60,
            "http://device/rec/1.ts".to_string(),
            RecordingState::Scheduled,
        );
        assert!(timer.url.is_empty());
        assert!(timer.is_timer());

        let recording = Recording::new(
            2,
            "ch1".to_string(),
            "Show".to_string(),
            0,
            60,
            "http://device/rec/2.ts".to_string(),
            RecordingState::Recorded,
        );
        assert_eq!(recording.url, "http://device/rec/2.ts");
        assert_eq!(recording.duration_secs(), 60);
    }

    #[test]
    fn test_software_version() {
        assert_eq!(
            SoftwareVersion::parse("VB.2.47.1"),
            Some(SoftwareVersion { major: 2, minor: 47, revision: 1 })
        );
        assert!(SoftwareVersion::parse("VB.2.47.1").unwrap().is_supported());
        assert!(SoftwareVersion::parse("2.46.20").unwrap().is_supported());
        assert!(!SoftwareVersion::parse("2.46.19").unwrap().is_supported());
        assert!(!SoftwareVersion::parse("1.99").unwrap().is_supported());
        assert_eq!(SoftwareVersion::parse("unknown"), None);
        assert_eq!(SoftwareVersion::MINIMUM.to_string(), "2.46.20");
    }
}
