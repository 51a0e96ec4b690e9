use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error};

use crate::domain::{AppError, Credential, DownloadRequest};

pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
/// KB/s (1.5 MB/s)
pub const DEFAULT_MIN_SPEED_THRESHOLD: f64 = 1536.0;

/// On-disk config: `{"settings": {...}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub settings: Settings,
}

/// Every field is optional; CLI flags take precedence over file values.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Settings {
    pub pixeldrain_api_key: Option<String>,
    pub retries: Option<u32>,
    pub retry_delay: Option<u64>,
    /// KB/s
    pub min_speed: Option<f64>,
    pub temp_dir: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
}

impl Settings {
    /// Fill every unset field of `self` from `fallback`.
    pub fn or(self, fallback: Settings) -> Settings {
        Settings {
            pixeldrain_api_key: self.pixeldrain_api_key.or(fallback.pixeldrain_api_key),
            retries: self.retries.or(fallback.retries),
            retry_delay: self.retry_delay.or(fallback.retry_delay),
            min_speed: self.min_speed.or(fallback.min_speed),
            temp_dir: self.temp_dir.or(fallback.temp_dir),
            download_dir: self.download_dir.or(fallback.download_dir),
        }
    }

    pub fn into_request(self, file_id: String) -> Result<DownloadRequest, AppError> {
        let max_attempts = self.retries.unwrap_or(DEFAULT_DOWNLOAD_RETRIES);
        if max_attempts == 0 {
            return Err(AppError::Config("retries must be at least 1".to_string()));
        }

        let min_speed_kbps = self.min_speed.unwrap_or(DEFAULT_MIN_SPEED_THRESHOLD);
        if !min_speed_kbps.is_finite() || min_speed_kbps <= 0.0 {
            return Err(AppError::Config(format!(
                "min_speed must be a positive number of KB/s, got {}",
                min_speed_kbps
            )));
        }

        Ok(DownloadRequest {
            file_id,
            credential: self.pixeldrain_api_key.and_then(Credential::new),
            temp_dir: self.temp_dir,
            download_dir: self.download_dir,
            min_speed_kbps,
            max_attempts,
            retry_delay: Duration::from_secs(self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY_SECS)),
        })
    }
}

pub fn parse_config(text: &str) -> Result<ConfigFile, serde_json::Error> {
    serde_json::from_str(text)
}

/// Load the config file. A missing file yields defaults; an unreadable or
/// malformed one is reported and ignored.
pub async fn load_config(path: &Path) -> ConfigFile {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No config file at {}", path.display());
            return ConfigFile::default();
        }
        Err(e) => {
            error!("Error loading config: {}", e);
            return ConfigFile::default();
        }
    };

    match parse_config(&text) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading config: {}", e);
            ConfigFile::default()
        }
    }
}
