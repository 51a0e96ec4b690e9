use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::partial_file::PartialFile;
use super::retry_controller::AttemptRunner;
use super::speed_monitor::{speed_kbps, LowSpeed, SpeedMonitor, SPEED_CHECK_WINDOW};
use crate::api::{self, ApiClient};
use crate::domain::{AttemptOutcome, DownloadRequest, TransferError};
use crate::ui::ProgressLine;
use crate::utils::fs::{ensure_directory, move_into};
use crate::utils::sanitize_filename;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamEnd {
    Completed { downloaded: u64 },
    LowSpeed(LowSpeed),
}

/// Drain `stream` into `sink`, feeding `monitor` (when present) after every
/// chunk. Stops early when the monitor reports low speed.
pub async fn write_stream<S, W>(
    mut stream: S,
    sink: &mut W,
    total: Option<u64>,
    mut monitor: Option<SpeedMonitor>,
    progress: &mut ProgressLine,
) -> Result<StreamEnd, TransferError>
where
    S: Stream<Item = api::Result<Bytes>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let start = Instant::now();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        sink.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        let now = Instant::now();
        let elapsed_ms = now.duration_since(start).as_millis() as u64;

        if let Some(monitor) = monitor.as_mut() {
            if let Some(low) = monitor.record(elapsed_ms, downloaded) {
                progress.abandon();
                return Ok(StreamEnd::LowSpeed(low));
            }
        }

        progress.update(downloaded, total, speed_kbps(downloaded, elapsed_ms), now);
    }

    sink.flush().await?;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    progress.finish(downloaded, total, speed_kbps(downloaded, elapsed_ms));

    Ok(StreamEnd::Completed { downloaded })
}

/// Runs one complete try at streaming a file into the temp directory.
#[derive(Clone)]
pub struct DownloadAttempt {
    api_client: ApiClient,
    show_progress: bool,
}

impl DownloadAttempt {
    pub fn new(api_client: ApiClient) -> Self {
        Self {
            api_client,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    async fn transfer(
        &self,
        request: &DownloadRequest,
        expected_size: Option<u64>,
        path: &Path,
        partial: &PartialFile,
    ) -> Result<StreamEnd, TransferError> {
        let credential = request.credential.as_ref();
        let (content_length, stream) = self
            .api_client
            .download_file_stream(&request.file_id, credential)
            .await?;
        let total = content_length.or(expected_size).filter(|size| *size > 0);

        partial.track(path);
        let mut file = tokio::fs::File::create(path).await?;

        // Authenticated downloads are never speed gated.
        let monitor = match (total, credential) {
            (Some(_), None) => Some(SpeedMonitor::new(request.min_speed_kbps)),
            _ => None,
        };

        let mut progress = ProgressLine::new(self.show_progress);
        let end = write_stream(stream, &mut file, total, monitor, &mut progress).await?;

        if let StreamEnd::Completed { downloaded } = end {
            file.sync_all().await?;
            debug!(downloaded, ?total, "stream complete");
        }

        Ok(end)
    }

    async fn place(&self, path: PathBuf, filename: &str, download_dir: Option<&Path>) -> PathBuf {
        let Some(dir) = download_dir else {
            return path;
        };

        match move_into(&path, dir, filename).await {
            Ok(moved) => moved,
            Err(e) => {
                warn!("Failed to move file: {}", e);
                info!("File remains at {}", path.display());
                path
            }
        }
    }
}

impl AttemptRunner for DownloadAttempt {
    async fn attempt(&self, request: &DownloadRequest, partial: &PartialFile) -> AttemptOutcome {
        let credential = request.credential.as_ref();
        let info = self
            .api_client
            .get_file_info(&request.file_id, credential)
            .await;

        let filename = info
            .as_ref()
            .map(|info| sanitize_filename(&info.name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| request.file_id.clone());

        let temp_dir = match ensure_directory(request.temp_dir.as_deref(), true).await {
            Ok(dir) => dir,
            Err(e) => {
                error!("Cannot resolve temp directory: {}", e);
                return AttemptOutcome::Failed;
            }
        };
        let path = temp_dir.join(&filename);

        info!("Filename: {}", filename);
        info!("Temp path: {}", path.display());

        let result = self
            .transfer(request, info.map(|info| info.size), &path, partial)
            .await;

        match result {
            Ok(StreamEnd::Completed { .. }) => {
                partial.clear();
                let path = self
                    .place(path, &filename, request.download_dir.as_deref())
                    .await;
                info!("Download complete");
                AttemptOutcome::Success { filename, path }
            }
            Ok(StreamEnd::LowSpeed(low)) => {
                warn!(
                    "Low speed detected: {:.2} MB/s in {}s window (need {:.2} MB/s)",
                    low.window_speed_kbps / 1024.0,
                    SPEED_CHECK_WINDOW.as_secs(),
                    low.threshold_kbps / 1024.0
                );
                partial.cleanup().await;
                AttemptOutcome::LowSpeed
            }
            Err(e) => {
                error!("Download error: {}", e);
                partial.cleanup().await;
                if e.is_forbidden() {
                    error!("Access forbidden - may require API key");
                }
                AttemptOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiConfig, ApiError};
    use crate::domain::Credential;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::tempdir;

    const KB: usize = 1024;

    fn engine_for(server: &mockito::Server) -> DownloadAttempt {
        let client = ApiClient::new(ApiConfig {
            base_url: server.url(),
            ..ApiConfig::default()
        })
        .unwrap();
        DownloadAttempt::new(client).with_progress(false)
    }

    fn request_in(temp_dir: &Path) -> DownloadRequest {
        DownloadRequest {
            file_id: "abc123".to_string(),
            credential: None,
            temp_dir: Some(temp_dir.to_path_buf()),
            download_dir: None,
            min_speed_kbps: 1536.0,
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }

    fn chunk_stream(chunks: Vec<api::Result<Bytes>>) -> api::client::ByteStream {
        futures::stream::iter(chunks).boxed()
    }

    /// `chunk_size` bytes every `interval`, `count` times.
    fn paced_stream(chunk_size: usize, interval: Duration, count: usize) -> api::client::ByteStream {
        futures::stream::unfold(0, move |sent| async move {
            if sent == count {
                return None;
            }
            tokio::time::sleep(interval).await;
            Some((Ok(Bytes::from(vec![0u8; chunk_size])), sent + 1))
        })
        .boxed()
    }

    #[tokio::test]
    async fn test_write_stream_counts_every_byte() {
        let chunks = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"")),
            Ok(Bytes::from_static(b"world")),
        ];
        let mut sink: Vec<u8> = Vec::new();
        let mut progress = ProgressLine::new(false);

        let end = write_stream(
            chunk_stream(chunks),
            &mut sink,
            Some(11),
            Some(SpeedMonitor::new(1536.0)),
            &mut progress,
        )
        .await
        .unwrap();

        assert_eq!(end, StreamEnd::Completed { downloaded: 11 });
        assert_eq!(sink, b"hello world");
    }

    #[tokio::test]
    async fn test_write_stream_propagates_transport_error() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(ApiError::InvalidResponse("connection reset".to_string())),
        ];
        let mut sink: Vec<u8> = Vec::new();
        let mut progress = ProgressLine::new(false);

        let result = write_stream(chunk_stream(chunks), &mut sink, None, None, &mut progress).await;
        assert!(matches!(result, Err(TransferError::Api(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_stream_aborts_throttled_transfer_after_window() {
        // 128 KB every 250ms = 512 KB/s for a 40 MB file
        let total = 40 * 1024 * KB;
        let stream = paced_stream(128 * KB, Duration::from_millis(250), total / (128 * KB));
        let mut sink: Vec<u8> = Vec::new();
        let mut progress = ProgressLine::new(false);
        let start = Instant::now();

        let end = write_stream(
            stream,
            &mut sink,
            Some(total as u64),
            Some(SpeedMonitor::new(1536.0)),
            &mut progress,
        )
        .await
        .unwrap();

        let StreamEnd::LowSpeed(low) = end else {
            panic!("expected low speed, got {:?}", end);
        };
        assert!((low.window_speed_kbps - 512.0).abs() < 1.0);
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(11));
        assert!(sink.len() < total);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_stream_without_monitor_finishes_slow_transfer() {
        let stream = paced_stream(128 * KB, Duration::from_millis(250), 60);
        let mut sink: Vec<u8> = Vec::new();
        let mut progress = ProgressLine::new(false);

        let end = write_stream(stream, &mut sink, Some((60 * 128 * KB) as u64), None, &mut progress)
            .await
            .unwrap();

        assert_eq!(
            end,
            StreamEnd::Completed {
                downloaded: (60 * 128 * KB) as u64
            }
        );
    }

    #[tokio::test]
    async fn test_attempt_falls_back_to_file_id_name() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/abc123/info")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/file/abc123")
            .with_status(200)
            .with_body(vec![7u8; 512000])
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let partial = PartialFile::new();
        let outcome = engine_for(&server)
            .attempt(&request_in(dir.path()), &partial)
            .await;

        let expected = dir.path().join("abc123");
        assert_eq!(
            outcome,
            AttemptOutcome::Success {
                filename: "abc123".to_string(),
                path: expected.clone()
            }
        );
        assert_eq!(std::fs::metadata(&expected).unwrap().len(), 512000);
        assert_eq!(partial.current(), None);
    }

    #[tokio::test]
    async fn test_attempt_uses_sanitized_info_name_and_moves_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/abc123/info")
            .with_status(200)
            .with_body(r#"{"name":"../report.pdf","size":5}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/file/abc123")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let temp = tempdir().unwrap();
        let done = tempdir().unwrap();
        let final_dir = done.path().join("library");
        let request = DownloadRequest {
            download_dir: Some(final_dir.clone()),
            ..request_in(temp.path())
        };

        let outcome = engine_for(&server).attempt(&request, &PartialFile::new()).await;

        let expected = final_dir.join("_report.pdf");
        assert_eq!(
            outcome,
            AttemptOutcome::Success {
                filename: "_report.pdf".to_string(),
                path: expected.clone()
            }
        );
        assert_eq!(std::fs::read(&expected).unwrap(), b"hello");
        assert!(!temp.path().join("_report.pdf").exists());
    }

    #[tokio::test]
    async fn test_attempt_keeps_file_when_move_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/abc123")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let temp = tempdir().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let request = DownloadRequest {
            download_dir: Some(blocker.join("child")),
            ..request_in(temp.path())
        };

        let outcome = engine_for(&server).attempt(&request, &PartialFile::new()).await;

        let expected = temp.path().join("abc123");
        assert_eq!(
            outcome,
            AttemptOutcome::Success {
                filename: "abc123".to_string(),
                path: expected.clone()
            }
        );
        assert_eq!(std::fs::read(&expected).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_attempt_rerun_overwrites_in_place() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/abc123")
            .with_status(200)
            .with_body("fresh")
            .expect(2)
            .create_async()
            .await;

        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("abc123"), b"stale contents").unwrap();
        let request = DownloadRequest {
            download_dir: Some(temp.path().to_path_buf()),
            ..request_in(temp.path())
        };
        let engine = engine_for(&server);

        for _ in 0..2 {
            let outcome = engine.attempt(&request, &PartialFile::new()).await;
            assert!(matches!(outcome, AttemptOutcome::Success { .. }));
            assert_eq!(std::fs::read(temp.path().join("abc123")).unwrap(), b"fresh");
        }
    }

    #[tokio::test]
    async fn test_attempt_forbidden_is_failed_and_leaves_nothing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/abc123")
            .with_status(403)
            .create_async()
            .await;

        let temp = tempdir().unwrap();
        let partial = PartialFile::new();
        let outcome = engine_for(&server)
            .attempt(&request_in(temp.path()), &partial)
            .await;

        assert_eq!(outcome, AttemptOutcome::Failed);
        assert!(!temp.path().join("abc123").exists());
        assert_eq!(partial.current(), None);
    }

    #[tokio::test]
    async fn test_attempt_sends_credential_to_both_endpoints() {
        let mut server = mockito::Server::new_async().await;
        let info = server
            .mock("GET", "/file/abc123/info")
            .match_header("authorization", "Basic OnNlY3JldA==")
            .with_status(200)
            .with_body(r#"{"name":"clip.mp4","size":5}"#)
            .create_async()
            .await;
        let file = server
            .mock("GET", "/file/abc123")
            .match_header("authorization", "Basic OnNlY3JldA==")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let temp = tempdir().unwrap();
        let request = DownloadRequest {
            credential: Credential::new("secret"),
            ..request_in(temp.path())
        };

        let outcome = engine_for(&server).attempt(&request, &PartialFile::new()).await;

        info.assert_async().await;
        file.assert_async().await;
        assert!(matches!(outcome, AttemptOutcome::Success { ref filename, .. } if filename == "clip.mp4"));
    }

    #[tokio::test]
    async fn test_attempt_failure_before_write_keeps_existing_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/abc123")
            .with_status(503)
            .create_async()
            .await;

        let temp = tempdir().unwrap();
        let existing = temp.path().join("abc123");
        std::fs::write(&existing, b"finished earlier").unwrap();

        let outcome = engine_for(&server)
            .attempt(&request_in(temp.path()), &PartialFile::new())
            .await;

        assert_eq!(outcome, AttemptOutcome::Failed);
        assert_eq!(std::fs::read(&existing).unwrap(), b"finished earlier");
    }

    #[tokio::test]
    async fn test_attempt_tracks_path_while_streaming() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/abc123")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(b"first ")?;
                w.flush()?;
                std::thread::sleep(Duration::from_millis(500));
                w.write_all(b"second")
            })
            .create_async()
            .await;

        let temp = tempdir().unwrap();
        let request = request_in(temp.path());
        let partial = PartialFile::new();
        let engine = engine_for(&server);

        let watch = async {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if let Some(path) = partial.current() {
                    return Some(path);
                }
                tokio::task::yield_now().await;
            }
            None
        };
        let (outcome, seen) = tokio::join!(engine.attempt(&request, &partial), watch);

        assert_eq!(seen, Some(temp.path().join("abc123")));
        assert!(matches!(outcome, AttemptOutcome::Success { .. }));
        assert_eq!(std::fs::read(temp.path().join("abc123")).unwrap(), b"first second");
        assert_eq!(partial.current(), None);
    }

    #[tokio::test]
    async fn test_attempt_clears_slot_when_temp_file_cannot_be_created() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file/abc123")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let temp = tempdir().unwrap();
        std::fs::create_dir(temp.path().join("abc123")).unwrap();
        let partial = PartialFile::new();

        let outcome = engine_for(&server)
            .attempt(&request_in(temp.path()), &partial)
            .await;

        assert_eq!(outcome, AttemptOutcome::Failed);
        assert_eq!(partial.current(), None);
        assert!(temp.path().join("abc123").is_dir());
    }
}
