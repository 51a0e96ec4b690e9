use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Resolve and create `dir`. `None` resolves to the working directory.
///
/// When creation fails and `fallback_to_cwd` is set, the working directory is
/// returned instead of the error.
pub async fn ensure_directory(dir: Option<&Path>, fallback_to_cwd: bool) -> io::Result<PathBuf> {
    let Some(dir) = dir else {
        return std::env::current_dir();
    };

    let resolved = absolute(dir)?;
    match tokio::fs::create_dir_all(&resolved).await {
        Ok(()) => Ok(resolved),
        Err(e) if fallback_to_cwd => {
            warn!("Cannot create directory {}: {}", resolved.display(), e);
            info!("Falling back to current directory");
            std::env::current_dir()
        }
        Err(e) => Err(e),
    }
}

/// Move a finished download into `dir`, keeping `filename`.
///
/// Rename first; when that fails (e.g. the directories live on different
/// filesystems) copy and delete the source. Returns the final path.
pub async fn move_into(source: &Path, dir: &Path, filename: &str) -> io::Result<PathBuf> {
    let dir = ensure_directory(Some(dir), false).await?;
    let destination = dir.join(filename);

    if is_same_file_path(source, &destination).await {
        info!("File already in target directory: {}", destination.display());
        return Ok(destination);
    }

    if let Err(rename_err) = tokio::fs::rename(source, &destination).await {
        tracing::debug!(error = %rename_err, "rename failed, copying instead");
        tokio::fs::copy(source, &destination).await?;
        tokio::fs::remove_file(source).await?;
        info!("File copied to {}", destination.display());
    } else {
        info!("File moved to {}", destination.display());
    }

    Ok(destination)
}

async fn is_same_file_path(source: &Path, destination: &Path) -> bool {
    let (Some(source_dir), Some(dest_dir)) = (source.parent(), destination.parent()) else {
        return false;
    };
    if source.file_name() != destination.file_name() {
        return false;
    }

    match (
        tokio::fs::canonicalize(source_dir).await,
        tokio::fs::canonicalize(dest_dir).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Best-effort removal of a partially written file.
pub async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!("Cleaned up partial download: {}", name);
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to cleanup {}: {}", path.display(), e),
    }
}
