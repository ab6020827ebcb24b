//! Guide channel mapper
//!
//! Associates the device's guide channel names with the channel names of an
//! external XMLTV guide. The association lives in a user-editable file:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <xmltvmap>
//!   <mapping vbox-name="BBC ONE" xmltv-name="BBC ONE"/>
//!   <mapping vbox-name="ITV" xmltv-name=""/>
//! </xmltvmap>
//! ```
//!
//! An empty `xmltv-name` means no counterpart is known. Every device channel
//! gets an entry so the file doubles as a worksheet for unmatched channels.

use quick_xml::events::{BytesDecl, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::xmltv::{get_attribute, Guide};

/// Device channel name -> external guide channel name ("" when unmapped)
pub type ChannelMap = BTreeMap<String, String>;

const ROOT_ELEMENT: &str = "xmltvmap";
const MAPPING_ELEMENT: &str = "mapping";
const VBOX_NAME_ATTR: &str = "vbox-name";
const XMLTV_NAME_ATTR: &str = "xmltv-name";

/// Owns the persisted channel map and its in-memory copy for the session
#[derive(Debug)]
pub struct GuideChannelMapper {
    path: PathBuf,
    mappings: ChannelMap,
}

impl GuideChannelMapper {
    /// Create a mapper backed by the file at `path`. Nothing is read until
    /// [`initialize`](Self::initialize) or [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mappings: ChannelMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a default mapping file if none exists yet, then load the file.
    ///
    /// An existing file is never overwritten, even when it no longer covers
    /// every device channel.
    pub fn initialize(&mut self, device_guide: &Guide, external_guide: &Guide) {
        if self.path.exists() {
            self.load();
            return;
        }

        info!(path = %self.path.display(), "no channel mapping file found, creating default mappings");
        let default_map = Self::create_default_map(device_guide, external_guide);

        match self.save(&default_map) {
            Ok(()) => self.load(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not persist default channel mappings");
                self.mappings = default_map;
            }
        }
    }

    /// Map every device channel to the external channel with exactly the same
    /// name, or to "" when there is none
    pub fn create_default_map(device_guide: &Guide, external_guide: &Guide) -> ChannelMap {
        device_guide
            .channel_names()
            .into_iter()
            .map(|name| {
                let external = if external_guide.has_channel_name(&name) {
                    name.clone()
                } else {
                    String::new()
                };
                (name, external)
            })
            .collect()
    }

    /// Replace the in-memory map with the contents of the mapping file.
    ///
    /// A missing or unreadable file leaves the map empty. Entries read before
    /// a syntax error are kept. Duplicate device names: the last one wins.
    pub fn load(&mut self) {
        self.mappings.clear();

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "channel mapping file not readable");
                return;
            }
        };

        let mut reader = Reader::from_reader(contents.as_bytes());
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                    if e.name().as_ref() == MAPPING_ELEMENT.as_bytes() =>
                {
                    match get_attribute(e, VBOX_NAME_ATTR.as_bytes()) {
                        Some(vbox_name) => {
                            let xmltv_name = get_attribute(e, XMLTV_NAME_ATTR.as_bytes()).unwrap_or_default();
                            self.mappings.insert(vbox_name, xmltv_name);
                        }
                        None => debug!("skipping mapping without {}", VBOX_NAME_ATTR),
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        position = reader.buffer_position(),
                        error = %e,
                        "channel mapping file is malformed, keeping {} mappings read so far",
                        self.mappings.len()
                    );
                    break;
                }
                _ => {}
            }
            buf.clear();
        }

        debug!(count = self.mappings.len(), "channel mappings loaded");
    }

    /// Serialize the full map to the mapping file
    pub fn save(&self, channel_map: &ChannelMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, Self::to_document(channel_map)?)?;
        Ok(())
    }

    /// Persist `channel_map` and make it the active mapping
    pub fn replace(&mut self, channel_map: &ChannelMap) -> Result<()> {
        self.save(channel_map)?;
        self.load();
        Ok(())
    }

    fn to_document(channel_map: &ChannelMap) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer
            .create_element(ROOT_ELEMENT)
            .write_inner_content(|w| {
                for (vbox_name, xmltv_name) in channel_map {
                    w.create_element(MAPPING_ELEMENT)
                        .with_attribute((VBOX_NAME_ATTR, vbox_name.as_str()))
                        .with_attribute((XMLTV_NAME_ATTR, xmltv_name.as_str()))
                        .write_empty()?;
                }
                Ok(())
            })?;

        let mut document = writer.into_inner();
        document.push(b'\n');
        Ok(document)
    }

    /// External guide name for a device channel, "" when unmapped or unknown
    pub fn external_channel_name(&self, vbox_name: &str) -> &str {
        self.mappings.get(vbox_name).map(String::as_str).unwrap_or("")
    }

    pub fn mappings(&self) -> &ChannelMap {
        &self.mappings
    }
}
