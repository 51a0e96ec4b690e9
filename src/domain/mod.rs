pub mod error;
pub mod model;

pub use error::{AppError, TransferError};
pub use model::{AttemptOutcome, Credential, DownloadPhase, DownloadRequest};
