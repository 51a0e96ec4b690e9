pub mod download_attempt;
pub mod partial_file;
pub mod retry_controller;
pub mod speed_monitor;

pub use download_attempt::DownloadAttempt;
pub use retry_controller::{DownloadResult, RetryController};
