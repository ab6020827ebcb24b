//! Parsing of device control API responses

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{BoardInfo, Channel, Recording, RecordingState, SoftwareVersion, StorageInfo};
use crate::xmltv::{decode_xml_entities, SanitizingBufReader, XmltvTime};

/// Child element of a collected element
#[derive(Debug, Clone, Default)]
struct Child {
    name: String,
    text: String,
    attributes: HashMap<String, String>,
}

/// An element with its attributes and direct children
#[derive(Debug, Clone, Default)]
struct Element {
    attributes: HashMap<String, String>,
    children: Vec<Child>,
}

impl Element {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn child_text(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }

    fn child_texts<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.children
            .iter()
            .filter(move |c| c.name == name)
            .map(|c| c.text.as_str())
    }

    fn child_attribute(&self, child: &str, attribute: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.name == child)
            .and_then(|c| c.attributes.get(attribute))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

fn collect_attributes(e: &BytesStart) -> HashMap<String, String> {
    e.attributes()
        .flatten()
        .filter_map(|attr| {
            let key = String::from_utf8(attr.key.as_ref().to_vec()).ok()?;
            let raw = String::from_utf8(attr.value.as_ref().to_vec()).ok()?;
            Some((key, decode_xml_entities(&raw)))
        })
        .collect()
}

/// Collect every `outer` element of the document with its direct children
fn collect_elements(body: &str, outer: &str) -> Vec<Element> {
    let mut reader = Reader::from_reader(SanitizingBufReader::new(body.as_bytes()));
    let mut buf = Vec::new();
    let mut elements = Vec::new();
    let mut current: Option<Element> = None;
    let mut child: Option<Child> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == outer {
                    current = Some(Element {
                        attributes: collect_attributes(e),
                        children: Vec::new(),
                    });
                } else if current.is_some() && child.is_none() {
                    child = Some(Child {
                        name,
                        text: String::new(),
                        attributes: collect_attributes(e),
                    });
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == outer {
                    elements.push(Element {
                        attributes: collect_attributes(e),
                        children: Vec::new(),
                    });
                } else if let (Some(element), None) = (current.as_mut(), child.as_ref()) {
                    element.children.push(Child {
                        name,
                        text: String::new(),
                        attributes: collect_attributes(e),
                    });
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut c) = child {
                    c.text.push_str(&decode_xml_entities(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(ref mut c) = child {
                    let entity = format!("&{};", String::from_utf8_lossy(&e));
                    c.text.push_str(&decode_xml_entities(&entity));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(ref mut c) = child {
                    c.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                if name.as_ref() == outer.as_bytes() {
                    if let Some(element) = current.take() {
                        elements.push(element);
                    }
                    child = None;
                } else if child.as_ref().is_some_and(|c| c.name.as_bytes() == name.as_ref()) {
                    if let (Some(element), Some(mut c)) = (current.as_mut(), child.take()) {
                        c.text = c.text.trim().to_string();
                        element.children.push(c);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(position = reader.buffer_position(), error = %e, "malformed device response");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    elements
}

/// Text of the first element called `tag`, anywhere in the document
pub(crate) fn element_text(body: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_reader(SanitizingBufReader::new(body.as_bytes()));
    let mut buf = Vec::new();
    let mut inside = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == tag.as_bytes() => inside = true,
            Ok(Event::Empty(ref e)) if e.name().as_ref() == tag.as_bytes() => return Some(String::new()),
            Ok(Event::Text(e)) if inside => {
                text.push_str(&decode_xml_entities(&String::from_utf8_lossy(e.as_ref())));
            }
            Ok(Event::GeneralRef(e)) if inside => {
                text.push_str(&decode_xml_entities(&format!("&{};", String::from_utf8_lossy(&e))));
            }
            Ok(Event::End(ref e)) if inside && e.name().as_ref() == tag.as_bytes() => {
                return Some(text.trim().to_string());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// Fail with the device's own description when the response reports an error
pub(crate) fn check_status(body: &str) -> Result<()> {
    let Some(code) = element_text(body, "ErrorCode") else {
        return Ok(());
    };

    match code.parse::<i64>() {
        Ok(0) => Ok(()),
        _ => {
            let description = element_text(body, "ErrorDescription").unwrap_or_default();
            Err(Error::Backend(format!("device error {}: {}", code, description)))
        }
    }
}

pub(crate) fn parse_software_version(body: &str) -> Result<SoftwareVersion> {
    let raw = element_text(body, "SwVersion")
        .ok_or_else(|| Error::Backend("software version missing from response".to_string()))?;
    SoftwareVersion::parse(&raw)
        .ok_or_else(|| Error::Backend(format!("unrecognised software version '{}'", raw)))
}

pub(crate) fn parse_board_info(body: &str) -> BoardInfo {
    BoardInfo {
        model: element_text(body, "ModelName").unwrap_or_default(),
        serial: element_text(body, "SerialNumber").unwrap_or_default(),
    }
}

pub(crate) fn parse_storage(body: &str) -> StorageInfo {
    let number = |tag| {
        element_text(body, tag)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
    };
    let present = element_text(body, "State")
        .map(|s| s.eq_ignore_ascii_case("connected"))
        .unwrap_or(false);

    StorageInfo {
        present,
        total_mb: number("TotalSpace"),
        used_mb: number("UsedSpace"),
    }
}

/// Channel uid when the device omits its channel number
fn fallback_uid(xmltv_name: &str) -> u32 {
    let digest = Sha256::digest(xmltv_name.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Parse the device channel list.
///
/// Display names in order: name, type, unique number, encryption, channel
/// number.
pub(crate) fn parse_channels(body: &str) -> Vec<Channel> {
    collect_elements(body, "channel")
        .into_iter()
        .filter_map(|element| {
            let xmltv_name = element.attribute("id").filter(|id| !id.is_empty())?.to_string();
            let names: Vec<&str> = element.child_texts("display-name").collect();
            let field = |i: usize| names.get(i).copied().unwrap_or("");

            let uid = field(2)
                .parse::<u32>()
                .unwrap_or_else(|_| fallback_uid(&xmltv_name));

            Some(Channel {
                uid,
                name: field(0).to_string(),
                number: field(4).parse().unwrap_or(0),
                radio: field(1).eq_ignore_ascii_case("radio"),
                encrypted: field(3).eq_ignore_ascii_case("encrypted"),
                icon_url: element.child_attribute("icon", "src").unwrap_or("").to_string(),
                url: element.child_attribute("url", "src").unwrap_or("").to_string(),
                xmltv_name,
            })
        })
        .collect()
}

/// Parse the device record list, classifying every item once
pub(crate) fn parse_recordings(body: &str, now: DateTime<Utc>) -> Vec<Recording> {
    collect_elements(body, "record")
        .into_iter()
        .filter_map(|element| {
            let id = match element.child_text("RecordID").map(str::parse::<u32>) {
                Some(Ok(id)) => id,
                _ => {
                    debug!("skipping record without a usable RecordID");
                    return None;
                }
            };
            let time = |name| {
                element
                    .attribute(name)
                    .and_then(|t| XmltvTime::parse(t).ok())
                    .map(|t| t.to_unix())
            };
            let (Some(start), Some(end)) = (time("start"), time("stop")) else {
                debug!(id, "skipping record with unusable times");
                return None;
            };

            let local = element.child_text("LocalTarget");
            let external = element.child_text("ExternalTarget");
            let state = RecordingState::classify(
                element.child_text("State").unwrap_or(""),
                local.is_some(),
                external.is_some(),
                start,
                end,
                now,
            );
            let url = local.or(external).unwrap_or("").to_string();

            Some(Recording::new(
                id,
                element.attribute("channel").unwrap_or("").to_string(),
                element.child_text("ProgramTitle").unwrap_or("").to_string(),
                start,
                end,
                url,
                state,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CHANNELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="I1.2.vbox">
    <display-name>BBC ONE</display-name>
    <display-name>TV</display-name>
    <display-name>17</display-name>
    <display-name>Free</display-name>
    <display-name>101</display-name>
    <icon src="http://vbox/logo/bbc1.png"/>
    <url src="http://vbox/live/17.ts"/>
  </channel>
  <channel id="I1.3.vbox">
    <display-name>Radio &amp; Music</display-name>
    <display-name>Radio</display-name>
    <display-name>18</display-name>
    <display-name>Encrypted</display-name>
    <display-name>700</display-name>
  </channel>
  <channel id="">
    <display-name>Ghost</display-name>
  </channel>
</tv>"#;

    const RECORDS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
  <Status><ErrorCode>0</ErrorCode><ErrorDescription>OK</ErrorDescription></Status>
  <record channel="I1.2.vbox" start="20240115120000 +0000" stop="20240115130000 +0000">
    <RecordID>5</RecordID>
    <ProgramTitle>News</ProgramTitle>
    <State>Recorded</State>
    <LocalTarget>http://vbox/rec/5.ts</LocalTarget>
  </record>
  <record channel="I1.2.vbox" start="20240115120000 +0000" stop="20240115130000 +0000">
    <RecordID>6</RecordID>
    <ProgramTitle>Film</ProgramTitle>
    <State>Recorded</State>
    <ExternalTarget>smb://nas/film.ts</ExternalTarget>
  </record>
  <record channel="I1.3.vbox" start="20300115120000 +0000" stop="20300115130000 +0000">
    <RecordID>7</RecordID>
    <ProgramTitle>Future</ProgramTitle>
    <State>Scheduled</State>
  </record>
  <record channel="I1.3.vbox" start="20300115120000 +0000" stop="20300115130000 +0000">
    <ProgramTitle>No id</ProgramTitle>
  </record>
</response>"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_channels() {
        let channels = parse_channels(CHANNELS);
        assert_eq!(channels.len(), 2);

        let bbc = &channels[0];
        assert_eq!(bbc.uid, 17);
        assert_eq!(bbc.name, "BBC ONE");
        assert_eq!(bbc.number, 101);
        assert!(!bbc.radio);
        assert!(!bbc.encrypted);
        assert_eq!(bbc.icon_url, "http://vbox/logo/bbc1.png");
        assert_eq!(bbc.url, "http://vbox/live/17.ts");
        assert_eq!(bbc.xmltv_name, "I1.2.vbox");

        let radio = &channels[1];
        assert_eq!(radio.name, "Radio & Music");
        assert!(radio.radio);
        assert!(radio.encrypted);
        assert!(radio.icon_url.is_empty());
    }

    #[test]
    fn test_channel_without_number_gets_stable_uid() {
        let body = r#"<tv><channel id="I9.vbox"><display-name>Dave</display-name></channel></tv>"#;
        let first = parse_channels(body);
        let second = parse_channels(body);
        assert_eq!(first[0].uid, second[0].uid);
    }

    #[test]
    fn test_parse_recordings() {
        let recordings = parse_recordings(RECORDS, now());
        assert_eq!(recordings.len(), 3);

        assert_eq!(recordings[0].id, 5);
        assert_eq!(recordings[0].state(), RecordingState::Recorded);
        assert_eq!(recordings[0].url, "http://vbox/rec/5.ts");
        assert_eq!(recordings[0].duration_secs(), 3600);

        assert_eq!(recordings[1].state(), RecordingState::External);
        assert_eq!(recordings[1].url, "smb://nas/film.ts");

        assert_eq!(recordings[2].state(), RecordingState::Scheduled);
        assert_eq!(recordings[2].channel_id, "I1.3.vbox");
        assert!(recordings[2].url.is_empty());
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(RECORDS).is_ok());
        assert!(check_status("<tv></tv>").is_ok());

        let failed = r#"<response><Status><ErrorCode>3</ErrorCode><ErrorDescription>No storage</ErrorDescription></Status></response>"#;
        match check_status(failed) {
            Err(Error::Backend(msg)) => assert!(msg.contains("No storage")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_version_board_and_storage() {
        let version = parse_software_version("<response><SwVersion>VB.2.47.1</SwVersion></response>").unwrap();
        assert!(version.is_supported());
        assert!(parse_software_version("<response/>").is_err());

        let board = parse_board_info(
            "<response><ModelName>VB.210</ModelName><SerialNumber>ABC</SerialNumber></response>",
        );
        assert_eq!(board.model, "VB.210");

        let storage = parse_storage(
            "<response><Storage><State>Connected</State><TotalSpace>1000</TotalSpace><UsedSpace>250</UsedSpace></Storage></response>",
        );
        assert!(storage.present);
        assert_eq!(storage.total_mb, 1000);
        assert_eq!(storage.used_mb, 250);

        assert!(!parse_storage("<response><Storage><State>Disconnected</State></Storage></response>").present);
    }
}
