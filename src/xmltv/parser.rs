//! XMLTV guide parser
//! Streaming parser for guide documents - handles large external guides
//! Supports both plain XML and gzip-compressed (.xml.gz) files

use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::{BufRead, Read, Seek};
use std::path::Path;
use tracing::{debug, warn};

use super::guide::{Guide, GuideChannel, Programme};
use super::time::XmltvTime;
use crate::error::Result;

/// Maximum number of parse errors kept for reporting
const MAX_STORED_ERRORS: usize = 50;

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    Root,
    Channel,
    Programme,
    Title,
    Desc,
    Category,
    DisplayName,
}

/// Programme being assembled while its element is open
struct PendingProgramme {
    channel_id: String,
    start: Option<XmltvTime>,
    stop: Option<XmltvTime>,
    title: String,
    description: String,
    category: Option<String>,
}

impl PendingProgramme {
    fn into_programme(self) -> Option<Programme> {
        if self.channel_id.is_empty() || self.title.is_empty() {
            return None;
        }
        let programme = Programme::new(
            self.channel_id,
            self.start?,
            self.stop?,
            self.title,
            self.description,
        );
        Some(programme.with_category(self.category))
    }
}

/// Guide parser for XMLTV documents
pub struct GuideParser;

impl GuideParser {
    /// Parse a guide from an XMLTV string
    pub fn parse(xml: &str) -> Guide {
        Self::parse_reader(SanitizingBufReader::new(xml.as_bytes()))
    }

    /// Parse a guide from a reader. Malformed elements are skipped and
    /// recorded in `parse_errors`; whatever could be read is returned.
    pub fn parse_reader<R: BufRead>(reader: R) -> Guide {
        // Text is trimmed per element instead; trimming each event would eat
        // the spaces around entity references
        let mut xml_reader = Reader::from_reader(reader);

        let mut guide = Guide::new();
        let mut buf = Vec::with_capacity(8192);

        let mut state = ParserState::Root;
        let mut current_channel: Option<GuideChannel> = None;
        let mut current_programme: Option<PendingProgramme> = None;
        let mut text_buf = String::new();
        let mut errors: Vec<String> = Vec::new();
        let mut error_count = 0;

        loop {
            let position = xml_reader.buffer_position();
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                    b"channel" => {
                        let id = get_attribute(e, b"id").unwrap_or_default();
                        if !id.is_empty() {
                            guide.add_channel(GuideChannel { id, name: String::new(), icon: None });
                        }
                    }
                    b"programme" => guide.skipped_programmes += 1,
                    b"icon" if state == ParserState::Channel => {
                        if let Some(ref mut chan) = current_channel {
                            chan.icon = get_attribute(e, b"src");
                        }
                    }
                    _ => {}
                },
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"channel" => {
                        state = ParserState::Channel;
                        current_channel = Some(GuideChannel {
                            id: get_attribute(e, b"id").unwrap_or_default(),
                            name: String::new(),
                            icon: None,
                        });
                    }
                    b"programme" => {
                        state = ParserState::Programme;
                        current_programme = Some(PendingProgramme {
                            channel_id: get_attribute(e, b"channel").unwrap_or_default(),
                            start: time_attribute(e, b"start"),
                            stop: time_attribute(e, b"stop"),
                            title: String::new(),
                            description: String::new(),
                            category: None,
                        });
                    }
                    b"title" if state == ParserState::Programme => {
                        state = ParserState::Title;
                        text_buf.clear();
                    }
                    b"desc" if state == ParserState::Programme => {
                        state = ParserState::Desc;
                        text_buf.clear();
                    }
                    b"category" if state == ParserState::Programme => {
                        state = ParserState::Category;
                        text_buf.clear();
                    }
                    b"display-name" if state == ParserState::Channel => {
                        state = ParserState::DisplayName;
                        text_buf.clear();
                    }
                    b"icon" if state == ParserState::Channel => {
                        if let Some(ref mut chan) = current_channel {
                            chan.icon = get_attribute(e, b"src");
                        }
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if is_text_state(state) {
                        text_buf.push_str(&decode_xml_entities(&String::from_utf8_lossy(e.as_ref())));
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    if is_text_state(state) {
                        let entity = format!("&{};", String::from_utf8_lossy(&e));
                        text_buf.push_str(&decode_xml_entities(&entity));
                    }
                }
                Ok(Event::CData(e)) => {
                    if is_text_state(state) {
                        text_buf.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"channel" => {
                        if let Some(channel) = current_channel.take() {
                            if !channel.id.is_empty() {
                                guide.add_channel(channel);
                            }
                        }
                        state = ParserState::Root;
                    }
                    b"programme" => {
                        if let Some(pending) = current_programme.take() {
                            match pending.into_programme() {
                                Some(programme) => guide.add_programme(programme),
                                None => guide.skipped_programmes += 1,
                            }
                        }
                        state = ParserState::Root;
                    }
                    b"title" if state == ParserState::Title => {
                        if let Some(ref mut prog) = current_programme {
                            prog.title = text_buf.trim().to_string();
                        }
                        state = ParserState::Programme;
                    }
                    b"desc" if state == ParserState::Desc => {
                        if let Some(ref mut prog) = current_programme {
                            prog.description = text_buf.trim().to_string();
                        }
                        state = ParserState::Programme;
                    }
                    b"category" if state == ParserState::Category => {
                        if let Some(ref mut prog) = current_programme {
                            let cat = text_buf.trim();
                            if !cat.is_empty() && prog.category.is_none() {
                                prog.category = Some(cat.to_string());
                            }
                        }
                        state = ParserState::Programme;
                    }
                    b"display-name" if state == ParserState::DisplayName => {
                        if let Some(ref mut chan) = current_channel {
                            if chan.name.is_empty() {
                                chan.name = text_buf.trim().to_string();
                            }
                        }
                        state = ParserState::Channel;
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    error_count += 1;
                    if errors.len() < MAX_STORED_ERRORS {
                        errors.push(format!("XML error at byte {}: {}", position, e));
                    }

                    // Skip the malformed element
                    current_programme = None;
                    current_channel = None;
                    state = ParserState::Root;
                    text_buf.clear();
                }
                _ => {}
            }
            buf.clear();
        }

        guide.finalize();
        guide.parse_errors = errors;
        guide.parse_error_count = error_count;

        if error_count > 0 {
            warn!(errors = error_count, "guide parsed with errors");
        }
        debug!(
            channels = guide.channels().len(),
            programmes = guide.programme_count(),
            skipped = guide.skipped_programmes,
            "guide parsed"
        );

        guide
    }

    /// Parse a guide from file - auto-detects gzip compression
    pub fn parse_file(path: &Path) -> Result<Guide> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::with_capacity(64 * 1024, file);

        // Read first 2 bytes to check for gzip magic number (1f 8b)
        let mut magic = [0u8; 2];
        let is_gzip = match reader.read_exact(&mut magic) {
            Ok(()) => magic == [0x1f, 0x8b],
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
            Err(e) => return Err(e.into()),
        };
        reader.seek(std::io::SeekFrom::Start(0))?;

        if is_gzip {
            let decoder = GzDecoder::new(reader);
            let buf_reader = std::io::BufReader::with_capacity(64 * 1024, decoder);
            Ok(Self::parse_reader(SanitizingBufReader::new(buf_reader)))
        } else {
            Ok(Self::parse_reader(SanitizingBufReader::new(reader)))
        }
    }
}

fn is_text_state(state: ParserState) -> bool {
    matches!(
        state,
        ParserState::Title | ParserState::Desc | ParserState::Category | ParserState::DisplayName
    )
}

fn time_attribute(e: &BytesStart, name: &[u8]) -> Option<XmltvTime> {
    let raw = get_attribute(e, name)?;
    match XmltvTime::parse(&raw) {
        Ok(time) => Some(time),
        Err(err) => {
            debug!(error = %err, "ignoring programme time");
            None
        }
    }
}

/// BufReader wrapper that filters out illegal XML 1.0 characters on read
/// Legal XML 1.0: #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
/// Also escapes bare ampersands, a common defect in published guides
pub(crate) struct SanitizingBufReader<R> {
    inner: R,
    buffer: Vec<u8>,
    out_buffer: Vec<u8>,
    /// Bytes read but held back because they might start an entity split
    /// across reads
    carry: Vec<u8>,
    pos: usize,
    filled: usize,
}

impl<R: Read> SanitizingBufReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: vec![0u8; 64 * 1024],
            out_buffer: Vec::with_capacity(96 * 1024),
            carry: Vec::new(),
            pos: 0,
            filled: 0,
        }
    }

    fn sanitize_byte(b: u8) -> u8 {
        match b {
            0x09 | 0x0A | 0x0D => b,
            0x00..=0x1F => 0x20,
            0x7F => 0x20,
            _ => b,
        }
    }

    fn refill_buffer(&mut self) -> std::io::Result<()> {
        let n = loop {
            match self.inner.read(&mut self.buffer) {
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        let at_eof = n == 0;

        let mut input = std::mem::take(&mut self.carry);
        input.extend_from_slice(&self.buffer[..n]);
        self.out_buffer.clear();

        let mut i = 0;
        while i < input.len() {
            let b = Self::sanitize_byte(input[i]);

            if b == b'&' {
                let remaining = &input[i..];
                // An entity cut off by the read boundary is decided next time
                if !at_eof && remaining.len() < 10 && !remaining.contains(&b';') {
                    self.carry.extend_from_slice(remaining);
                    break;
                }
                if !Self::is_valid_entity_start(remaining) {
                    self.out_buffer.extend_from_slice(b"&amp;");
                    i += 1;
                    continue;
                }
            }

            self.out_buffer.push(b);
            i += 1;
        }

        self.pos = 0;
        self.filled = self.out_buffer.len();
        Ok(())
    }

    /// Check if bytes starting with & look like a valid XML entity
    fn is_valid_entity_start(bytes: &[u8]) -> bool {
        if bytes.len() < 2 {
            return false;
        }

        if bytes[1] == b'#' {
            return true;
        }

        let mut end = 1;
        while end < bytes.len() && end < 10 {
            match bytes[end] {
                b';' => return end > 1,
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => end += 1,
                _ => return false,
            }
        }

        false
    }

    /// Refill until output is available or the source is exhausted
    fn ensure_filled(&mut self) -> std::io::Result<()> {
        while self.pos >= self.filled {
            let had_carry = !self.carry.is_empty();
            self.refill_buffer()?;
            if self.filled == 0 && !had_carry && self.carry.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for SanitizingBufReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.ensure_filled()?;
        let available = self.filled - self.pos;
        let to_copy = available.min(buf.len());
        buf[..to_copy].copy_from_slice(&self.out_buffer[self.pos..self.pos + to_copy]);
        self.pos += to_copy;
        Ok(to_copy)
    }
}

impl<R: Read> BufRead for SanitizingBufReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.ensure_filled()?;
        Ok(&self.out_buffer[self.pos..self.filled])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}

/// Decode XML entities back to normal characters
pub(crate) fn decode_xml_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find('&') {
        result.push_str(&rest[..start]);
        let tail = &rest[start..];

        let decoded = tail.find(';').and_then(|end| {
            let entity = &tail[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => {
                    let num = entity.strip_prefix('#')?;
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            c.map(|c| (c, end + 1))
        });

        match decoded {
            Some((c, consumed)) => {
                result.push(c);
                rest = &tail[consumed..];
            }
            None => {
                result.push('&');
                rest = &tail[1..];
            }
        }
    }

    result.push_str(rest);
    result
}

/// Get attribute value from XML element
pub(crate) fn get_attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            let raw = String::from_utf8(attr.value.as_ref().to_vec()).ok()?;
            return Some(decode_xml_entities(&raw));
        }
    }
    None
}
