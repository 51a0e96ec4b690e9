use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("Invalid PixelDrain URL or file ID: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Errors that end a single download attempt with a `Failed` outcome.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, TransferError::Api(e) if e.is_forbidden())
    }
}
