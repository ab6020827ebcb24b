//! XMLTV timestamps: "20240115120000 +0000"

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{Error, Result};

const XMLTV_FORMAT: &str = "%Y%m%d%H%M%S %z";
const XMLTV_FORMAT_NO_SPACE: &str = "%Y%m%d%H%M%S%z";
const XMLTV_FORMAT_NAIVE: &str = "%Y%m%d%H%M%S";

/// A point in time in XMLTV notation, keeping the offset it was written with
/// so that formatting reproduces the original text.
///
/// Equality and ordering compare instants, not offsets.
#[derive(Debug, Clone, Copy)]
pub struct XmltvTime {
    dt: DateTime<FixedOffset>,
    /// Written as "-0000" (UTC, local offset unknown)
    negative_zero: bool,
}

impl XmltvTime {
    /// Parse an XMLTV timestamp.
    ///
    /// Accepts the canonical "YYYYMMDDhhmmss +hhmm", the same without the
    /// space, and a bare "YYYYMMDDhhmmss" which is taken as UTC.
    pub fn parse(time_str: &str) -> Result<Self> {
        let time_str = time_str.trim();

        let with_offset = DateTime::parse_from_str(time_str, XMLTV_FORMAT)
            .or_else(|_| DateTime::parse_from_str(time_str, XMLTV_FORMAT_NO_SPACE));
        if let Ok(dt) = with_offset {
            return Ok(Self {
                dt,
                negative_zero: time_str.ends_with("-0000"),
            });
        }

        NaiveDateTime::parse_from_str(time_str, XMLTV_FORMAT_NAIVE)
            .map(|naive| Self::from_datetime(naive.and_utc().fixed_offset()))
            .map_err(|e| Error::InvalidParameters(format!("bad XMLTV time '{}': {}", time_str, e)))
    }

    /// Convert a Unix timestamp, expressed in UTC
    pub fn from_unix(ts: i64) -> Result<Self> {
        Utc.timestamp_opt(ts, 0)
            .single()
            .map(|dt| Self::from_datetime(dt.fixed_offset()))
            .ok_or_else(|| Error::InvalidParameters(format!("timestamp out of range: {}", ts)))
    }

    fn from_datetime(dt: DateTime<FixedOffset>) -> Self {
        Self {
            dt,
            negative_zero: false,
        }
    }

    pub fn to_unix(&self) -> i64 {
        self.dt.timestamp()
    }

    pub fn datetime(&self) -> DateTime<FixedOffset> {
        self.dt
    }
}

impl PartialEq for XmltvTime {
    fn eq(&self, other: &Self) -> bool {
        self.dt == other.dt
    }
}

impl Eq for XmltvTime {}

impl PartialOrd for XmltvTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XmltvTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dt.cmp(&other.dt)
    }
}

impl Hash for XmltvTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dt.hash(state);
    }
}

impl fmt::Display for XmltvTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative_zero {
            write!(f, "{} -0000", self.dt.format(XMLTV_FORMAT_NAIVE))
        } else {
            write!(f, "{}", self.dt.format(XMLTV_FORMAT))
        }
    }
}

impl FromStr for XmltvTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
