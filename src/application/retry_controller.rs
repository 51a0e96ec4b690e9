use std::path::PathBuf;

use tracing::{error, info, info_span, warn, Instrument};

use super::partial_file::PartialFile;
use crate::domain::{AttemptOutcome, DownloadPhase, DownloadRequest};

/// One complete try at fetching the requested file.
pub trait AttemptRunner {
    async fn attempt(&self, request: &DownloadRequest, partial: &PartialFile) -> AttemptOutcome;
}

/// How a phase ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult {
    Success { filename: String, path: PathBuf },
    /// Unauthenticated transfer was too slow; skips the rest of the phase.
    LowSpeed,
    /// Every attempt failed.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    Completed { filename: String, path: PathBuf },
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    Running(DownloadPhase),
    Done(DownloadResult),
}

impl ControllerState {
    pub fn start() -> Self {
        ControllerState::Running(DownloadPhase::Anonymous)
    }

    /// Transition taken when `phase` ends with `result`.
    pub fn after(phase: DownloadPhase, result: PhaseResult, has_credential: bool) -> Self {
        match (phase, result) {
            (_, PhaseResult::Success { filename, path }) => {
                ControllerState::Done(DownloadResult::Completed { filename, path })
            }
            (DownloadPhase::Anonymous, PhaseResult::LowSpeed | PhaseResult::Exhausted)
                if has_credential =>
            {
                ControllerState::Running(DownloadPhase::Authenticated)
            }
            (DownloadPhase::Anonymous, _) | (DownloadPhase::Authenticated, _) => {
                ControllerState::Done(DownloadResult::Failed)
            }
        }
    }
}

/// Drives attempts through the unauthenticated and authenticated phases.
pub struct RetryController<A> {
    runner: A,
    request: DownloadRequest,
    partial: PartialFile,
}

impl<A: AttemptRunner> RetryController<A> {
    pub fn new(runner: A, request: DownloadRequest) -> Self {
        Self {
            runner,
            request,
            partial: PartialFile::new(),
        }
    }

    /// Handle to the in-flight partial file, for signal-time cleanup.
    pub fn partial_file(&self) -> PartialFile {
        self.partial.clone()
    }

    pub async fn run(&self) -> DownloadResult {
        let has_credential = self.request.has_credential();
        let mut state = ControllerState::start();

        loop {
            match state {
                ControllerState::Running(phase) => {
                    info!("--- {} ---", phase);
                    let result = self.run_phase(phase).await;
                    let next = ControllerState::after(phase, result.clone(), has_credential);

                    match (&result, &next) {
                        (PhaseResult::LowSpeed, ControllerState::Running(_)) => {
                            info!("Switching to API key download...")
                        }
                        (PhaseResult::Exhausted, ControllerState::Running(_)) => {
                            info!("Retrying with API key...")
                        }
                        (_, ControllerState::Done(DownloadResult::Failed)) if !has_credential => {
                            error!("Failed without API key, and no key provided")
                        }
                        (_, ControllerState::Done(DownloadResult::Failed)) => {
                            error!("Failed after all retries")
                        }
                        _ => {}
                    }

                    state = next;
                }
                ControllerState::Done(result) => return result,
            }
        }
    }

    async fn run_phase(&self, phase: DownloadPhase) -> PhaseResult {
        let request = match phase {
            DownloadPhase::Anonymous => self.request.without_credential(),
            DownloadPhase::Authenticated => self.request.clone(),
        };
        let attempts = request.max_attempts.max(1);

        for attempt in 1..=attempts {
            let span = info_span!("attempt", phase = phase.number(), attempt);
            info!(parent: &span, "Attempt {}/{}...", attempt, attempts);

            let outcome = self
                .runner
                .attempt(&request, &self.partial)
                .instrument(span)
                .await;

            match outcome {
                AttemptOutcome::Success { filename, path } => {
                    return PhaseResult::Success { filename, path };
                }
                AttemptOutcome::LowSpeed if phase == DownloadPhase::Anonymous => {
                    return PhaseResult::LowSpeed;
                }
                AttemptOutcome::LowSpeed | AttemptOutcome::Failed => {}
            }

            if attempt < attempts {
                warn!(
                    phase = phase.number(),
                    attempt,
                    "Error. Retrying in {}s...",
                    request.retry_delay.as_secs()
                );
                tokio::time::sleep(request.retry_delay).await;
            }
        }

        PhaseResult::Exhausted
    }
}
