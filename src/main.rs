mod api;
mod application;
mod cli;
mod config;
mod domain;
mod ui;
mod utils;

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{ApiClient, ApiConfig};
use crate::application::{DownloadAttempt, DownloadResult, RetryController};
use crate::cli::Args;
use crate::domain::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Interrupt,
    Terminate,
}

impl Shutdown {
    fn exit_code(self) -> u8 {
        match self {
            Shutdown::Interrupt => 130,
            Shutdown::Terminate => 143,
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug {
        "debug,hyper=warn,reqwest=warn"
    } else {
        "info,hyper=warn,reqwest=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Shutdown {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            _ = ctrl_c() => Shutdown::Interrupt,
            _ = terminate.recv() => Shutdown::Terminate,
        },
        Err(_) => {
            ctrl_c().await;
            Shutdown::Interrupt
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Shutdown {
    ctrl_c().await;
    Shutdown::Interrupt
}

async fn prompt_for_url() -> Result<String, AppError> {
    print!("Enter PixelDrain file URL: ");
    std::io::stdout()
        .flush()
        .map_err(|e| AppError::Io(e.to_string()))?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .map_err(|e| AppError::Io(e.to_string()))?;

    Ok(line.trim().to_string())
}

async fn run(args: Args) -> Result<ExitCode, AppError> {
    let file_config = config::load_config(&args.config).await;

    let input = match &args.url {
        Some(url) => url.trim().to_string(),
        None => prompt_for_url().await?,
    };
    if input.is_empty() {
        return Err(AppError::InvalidInput("URL cannot be empty".to_string()));
    }

    let file_id = utils::extract_file_id(&input)
        .ok_or_else(|| AppError::InvalidInput(format!("could not extract file ID from {}", input)))?;

    let request = args.overrides().or(file_config.settings).into_request(file_id)?;
    info!(file_id = %request.file_id, "Starting download");

    let api_client =
        ApiClient::new(ApiConfig::default()).map_err(|e| AppError::Config(e.to_string()))?;
    let engine = DownloadAttempt::new(api_client).with_progress(!args.quiet);
    let controller = RetryController::new(engine, request);
    let partial = controller.partial_file();

    tokio::select! {
        result = controller.run() => match result {
            DownloadResult::Completed { path, .. } => {
                info!("Saved: {}", path.display());
                Ok(ExitCode::SUCCESS)
            }
            DownloadResult::Failed => Ok(ExitCode::FAILURE),
        },
        signal = shutdown_signal() => {
            match partial.current() {
                Some(path) => warn!("Received {:?}, removing {}", signal, path.display()),
                None => warn!("Received {:?}, exiting", signal),
            }
            partial.cleanup().await;
            Ok(ExitCode::from(signal.exit_code()))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(args.debug);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
