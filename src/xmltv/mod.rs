//! XMLTV guide module
//!
//! Contains the guide parser, the in-memory guide and timestamp handling.

mod download;
mod guide;
mod parser;
mod time;


pub use download::{load_guide, DownloadConfig, GuideDownloader};
pub use guide::{Guide, GuideChannel, Programme, Schedule};
pub use parser::GuideParser;
pub use time::XmltvTime;

pub(crate) use parser::{decode_xml_entities, get_attribute, SanitizingBufReader};
