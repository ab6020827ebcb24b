//! In-memory XMLTV guide: channel list plus one schedule per channel

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::time::XmltvTime;

/// A single broadcast in a channel's schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Programme {
    /// Channel id (the `channel` attribute) this programme belongs to
    pub channel_id: String,
    pub start: XmltvTime,
    pub end: XmltvTime,
    pub title: String,
    pub description: String,
    /// Category/genre (optional)
    pub category: Option<String>,
    uid: u32,
}

impl Programme {
    pub fn new(
        channel_id: String,
        start: XmltvTime,
        end: XmltvTime,
        title: String,
        description: String,
    ) -> Self {
        let uid = programme_uid(&channel_id, &start, &end, &title);
        Self {
            channel_id,
            start,
            end,
            title,
            description,
            category: None,
            uid,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    /// Identifier derived from channel, times and title, so the same
    /// broadcast gets the same id on every refresh
    pub fn unique_id(&self) -> u32 {
        self.uid
    }

    pub fn duration_secs(&self) -> i64 {
        self.end.to_unix() - self.start.to_unix()
    }
}

fn programme_uid(channel_id: &str, start: &XmltvTime, end: &XmltvTime, title: &str) -> u32 {
    let digest = Sha256::new()
        .chain_update(channel_id.as_bytes())
        .chain_update([0u8])
        .chain_update(start.to_unix().to_be_bytes())
        .chain_update(end.to_unix().to_be_bytes())
        .chain_update(title.as_bytes())
        .finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Ordered, non-overlapping programmes of one channel
pub type Schedule = Vec<Programme>;

/// Channel entry of a guide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideChannel {
    /// Channel ID (the `id` attribute)
    pub id: String,
    /// First display name
    pub name: String,
    /// Channel icon/logo URL (optional)
    pub icon: Option<String>,
}

/// Parsed guide
#[derive(Debug, Clone, Default)]
pub struct Guide {
    /// Channels in document order
    channels: Vec<GuideChannel>,
    /// Display name -> channel id, first occurrence wins
    ids_by_name: HashMap<String, String>,
    /// Schedules indexed by channel id
    schedules: HashMap<String, Schedule>,
    /// Parse errors encountered (up to 50)
    pub parse_errors: Vec<String>,
    /// Total count of parse errors
    pub parse_error_count: usize,
    /// Programmes dropped for missing fields or overlaps
    pub skipped_programmes: usize,
}

impl Guide {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel; a duplicate id keeps the first entry
    pub fn add_channel(&mut self, channel: GuideChannel) {
        if self.channels.iter().any(|c| c.id == channel.id) {
            return;
        }
        self.ids_by_name
            .entry(channel.name.clone())
            .or_insert_with(|| channel.id.clone());
        self.schedules.entry(channel.id.clone()).or_default();
        self.channels.push(channel);
    }

    pub fn add_programme(&mut self, programme: Programme) {
        self.schedules
            .entry(programme.channel_id.clone())
            .or_default()
            .push(programme);
    }

    /// Sort every schedule by start time and drop programmes overlapping an
    /// earlier one
    pub(crate) fn finalize(&mut self) {
        let mut dropped = 0;
        for schedule in self.schedules.values_mut() {
            schedule.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
            let mut kept: Schedule = Vec::with_capacity(schedule.len());
            for programme in schedule.drain(..) {
                match kept.last() {
                    Some(last) if programme.start < last.end => dropped += 1,
                    _ => kept.push(programme),
                }
            }
            *schedule = kept;
        }
        self.skipped_programmes += dropped;
    }

    pub fn has_channel_name(&self, name: &str) -> bool {
        self.ids_by_name.contains_key(name)
    }

    /// Channel names in document order
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn channels(&self) -> &[GuideChannel] {
        &self.channels
    }

    /// Resolve a display name to the channel id used by schedules
    pub fn channel_id(&self, name: &str) -> Option<&str> {
        self.ids_by_name.get(name).map(String::as_str)
    }

    /// Schedule of a channel. `None` means the guide does not know the
    /// channel at all, which is distinct from an empty schedule.
    pub fn schedule(&self, channel_id: &str) -> Option<&Schedule> {
        self.schedules.get(channel_id)
    }

    /// Find a programme anywhere in the guide by its unique id
    pub fn programme(&self, uid: u32) -> Option<&Programme> {
        self.schedules
            .values()
            .flat_map(|s| s.iter())
            .find(|p| p.unique_id() == uid)
    }

    /// Total number of programmes
    pub fn programme_count(&self) -> usize {
        self.schedules.values().map(|v| v.len()).sum()
    }
}
