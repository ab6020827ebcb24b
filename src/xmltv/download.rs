//! External guide download over HTTP(S)

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::guide::Guide;
use super::parser::GuideParser;
use crate::error::{Error, Result};

/// Download configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Maximum retry attempts
    pub max_retries: u32,
    /// Delay between retries in milliseconds
    pub retry_delay_ms: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds
    pub read_timeout_secs: u64,
    /// Chunk size for reading (bytes)
    pub chunk_size: usize,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            connect_timeout_secs: 30,
            read_timeout_secs: 120,
            chunk_size: 64 * 1024,
            user_agent: concat!("vbox-pvr/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Guide downloader with retry support
pub struct GuideDownloader;

impl GuideDownloader {
    fn create_agent(config: &DownloadConfig) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.read_timeout_secs)))
            .timeout_connect(Some(Duration::from_secs(config.connect_timeout_secs)))
            .build()
            .new_agent()
    }

    /// Download to a file, retrying transport failures
    pub fn download_to_file(url: &str, output_path: &Path, config: &DownloadConfig) -> Result<u64> {
        let agent = Self::create_agent(config);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match Self::try_download(&agent, url, output_path, config) {
                Ok(total) => {
                    debug!(url, bytes = total, "guide downloaded");
                    return Ok(total);
                }
                Err(e) if attempts >= config.max_retries => {
                    return Err(Error::ConnectionLost(format!(
                        "guide download failed after {} attempts: {}",
                        attempts, e
                    )));
                }
                Err(e) => {
                    warn!(url, attempt = attempts, error = %e, "guide download failed, retrying");
                    std::thread::sleep(Duration::from_millis(config.retry_delay_ms));
                }
            }
        }
    }

    fn try_download(
        agent: &ureq::Agent,
        url: &str,
        output_path: &Path,
        config: &DownloadConfig,
    ) -> Result<u64> {
        let response = agent.get(url).header("User-Agent", &config.user_agent).call()?;

        let mut file = std::fs::File::create(output_path)?;
        let mut reader = response.into_body().into_reader();
        let mut buffer = vec![0u8; config.chunk_size];
        let mut downloaded: u64 = 0;

        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    file.write_all(&buffer[..n])?;
                    downloaded += n as u64;
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        file.flush()?;
        Ok(downloaded)
    }

    /// Download and parse a guide in one step
    pub fn download_and_parse(url: &str, config: &DownloadConfig) -> Result<Guide> {
        let ext = if url.ends_with(".gz") { "xml.gz" } else { "xml" };
        let temp_path: PathBuf =
            std::env::temp_dir().join(format!("vbox_pvr_guide_{}.{}", std::process::id(), ext));

        Self::download_to_file(url, &temp_path, config)?;

        // Parse the downloaded file (auto-detects gzip)
        let result = GuideParser::parse_file(&temp_path);
        let _ = std::fs::remove_file(&temp_path);

        result
    }
}

/// Load an external guide from a local path or an http(s) URL
pub fn load_guide(source: &str) -> Result<Guide> {
    if source.starts_with("http://") || source.starts_with("https://") {
        GuideDownloader::download_and_parse(source, &DownloadConfig::default())
    } else {
        GuideParser::parse_file(Path::new(source))
    }
}
