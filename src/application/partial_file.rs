use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::utils::fs::remove_partial;

/// Path of the file currently being written, if any.
///
/// Owned by the retry controller and shared with the shutdown handler so an
/// interrupted transfer does not leave a truncated file behind.
#[derive(Debug, Clone, Default)]
pub struct PartialFile {
    slot: Arc<Mutex<Option<PathBuf>>>,
}

impl PartialFile {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PathBuf>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn track(&self, path: &Path) {
        *self.lock() = Some(path.to_path_buf());
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    pub fn current(&self) -> Option<PathBuf> {
        self.lock().clone()
    }

    /// Delete the tracked file, if any, and clear the slot.
    pub async fn cleanup(&self) {
        let path = self.lock().take();
        if let Some(path) = path {
            remove_partial(&path).await;
        }
    }
}
