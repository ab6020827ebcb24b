//! Error types for the VBox backend

use thiserror::Error;

/// Errors raised by the backend, the device client and the XMLTV layer.
///
/// Expected absence (a channel without a mapping, a channel without a
/// schedule) is never an error; those lookups return `Option`.
#[derive(Debug, Error)]
pub enum Error {
    /// A channel, programme or recording could not be found
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller supplied a reference that cannot be resolved, or a value
    /// that failed to parse
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The device rejected or failed to execute a command
    #[error("backend error: {0}")]
    Backend(String),

    /// The device runs a firmware older than the supported minimum
    #[error("firmware version {found} is not supported, {required} or newer is required")]
    FirmwareIncompatible { found: String, required: String },

    /// The device could not be reached
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Error {
    /// Firmware incompatibility is the only failure that must never be retried
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::FirmwareIncompatible { .. })
    }
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::StatusCode(code) => Error::Backend(format!("HTTP error: {}", code)),
            other => Error::ConnectionLost(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_firmware_is_permanent() {
        let firmware = Error::FirmwareIncompatible {
            found: "2.40.1".to_string(),
            required: "2.46.20".to_string(),
        };
        assert!(firmware.is_permanent());
        assert!(!Error::ConnectionLost("timeout".to_string()).is_permanent());
        assert!(!Error::Backend("rejected".to_string()).is_permanent());
    }

    #[test]
    fn test_status_code_maps_to_backend() {
        let err: Error = ureq::Error::StatusCode(500).into();
        assert!(matches!(err, Error::Backend(_)));
    }
}
