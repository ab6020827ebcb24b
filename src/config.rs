//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

const APP_DIR: &str = "vbox_pvr";
const SETTINGS_FILE: &str = "settings.json";
const CHANNEL_MAP_FILE: &str = "channel_mappings.xml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// External XMLTV guide: local path or http(s) URL, empty to disable
    #[serde(default)]
    pub external_xmltv: String,
    /// Location of the channel mapping file, defaults to the config directory
    #[serde(default)]
    pub channel_map_path: Option<PathBuf>,
}

fn default_hostname() -> String { "localhost".to_string() }
fn default_port() -> u16 { 80 }
fn default_timeout() -> u64 { 60 }

impl Default for Settings {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            timeout_secs: default_timeout(),
            external_xmltv: String::new(),
            channel_map_path: None,
        }
    }
}

fn config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

impl Settings {
    fn settings_path() -> PathBuf {
        config_dir().join(SETTINGS_FILE)
    }

    /// Load settings, falling back to defaults when the file is missing or corrupt
    pub fn load() -> Self {
        let path = Self::settings_path();

        if path.exists() {
            match fs::read_to_string(&path).map(|content| serde_json::from_str(&content)) {
                Ok(Ok(settings)) => return settings,
                Ok(Err(e)) => warn!(path = %path.display(), error = %e, "ignoring corrupt settings file"),
                Err(e) => warn!(path = %path.display(), error = %e, "could not read settings file"),
            }
        }

        Self::default()
    }

    pub fn save(&self) -> crate::error::Result<()> {
        let path = Self::settings_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::Error::InvalidParameters(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn channel_map_path(&self) -> PathBuf {
        self.channel_map_path
            .clone()
            .unwrap_or_else(|| config_dir().join(CHANNEL_MAP_FILE))
    }

    pub fn use_external_guide(&self) -> bool {
        !self.external_xmltv.trim().is_empty()
    }
}
