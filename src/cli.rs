use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;

/// Download a file from PixelDrain.
///
/// Tries without an API key first and falls back to the key when the free
/// transfer keeps failing or stays below the minimum speed.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PixelDrain file URL or bare file ID. Prompted for when omitted.
    pub url: Option<String>,

    /// Path to the JSON config file.
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// PixelDrain API key.
    #[arg(long, env = "PIXELDRAIN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Attempts per phase.
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub retries: Option<u32>,

    /// Seconds to wait between attempts.
    #[arg(long)]
    pub retry_delay: Option<u64>,

    /// Minimum speed in KB/s before switching to the API key.
    #[arg(long)]
    pub min_speed: Option<f64>,

    /// Directory the file is downloaded into.
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Directory the finished file is moved to.
    #[arg(short = 'o', long)]
    pub download_dir: Option<PathBuf>,

    /// Hide the progress line.
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Args {
    pub fn overrides(&self) -> Settings {
        Settings {
            pixeldrain_api_key: self.api_key.clone(),
            retries: self.retries,
            retry_delay: self.retry_delay,
            min_speed: self.min_speed,
            temp_dir: self.temp_dir.clone(),
            download_dir: self.download_dir.clone(),
        }
    }
}
