use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use thiserror::Error;
use tracing::debug;

use super::models::{ApiConfig, FileInfo};
use crate::domain::Credential;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// 403 usually means the file is only served to authenticated users.
    pub fn is_forbidden(&self) -> bool {
        match self {
            ApiError::Status(status) => *status == StatusCode::FORBIDDEN,
            ApiError::RequestError(e) => e.status() == Some(StatusCode::FORBIDDEN),
            ApiError::InvalidResponse(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Lazy, single-pass sequence of body chunks.
pub type ByteStream = BoxStream<'static, Result<bytes::Bytes>>;

/// `Authorization` value for a pixeldrain API key: empty user, key as password.
pub fn basic_auth_value(credential: &Credential) -> String {
    let token = STANDARD.encode(format!(":{}", credential.expose()));
    format!("Basic {}", token)
}

#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    http: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { config, http })
    }

    fn get(&self, url: &str, credential: Option<&Credential>) -> RequestBuilder {
        let request = self.http.get(url);
        match credential {
            Some(credential) => request.header(header::AUTHORIZATION, basic_auth_value(credential)),
            None => request,
        }
    }

    async fn fetch_file_info(
        &self,
        file_id: &str,
        credential: Option<&Credential>,
    ) -> Result<FileInfo> {
        let response = self
            .get(&self.config.info_url(file_id), credential)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }

        let info: FileInfo = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("JSON decode error: {}", e)))?;

        if info.name.is_empty() {
            return Err(ApiError::InvalidResponse("empty file name".to_string()));
        }

        Ok(info)
    }

    /// Best-effort metadata lookup. Any failure means "no info available".
    pub async fn get_file_info(
        &self,
        file_id: &str,
        credential: Option<&Credential>,
    ) -> Option<FileInfo> {
        match self.fetch_file_info(file_id, credential).await {
            Ok(info) => Some(info),
            Err(e) => {
                debug!(file_id, error = %e, "file info unavailable");
                None
            }
        }
    }

    /// Open the file endpoint as a chunk stream.
    /// Returns (content_length, stream)
    pub async fn download_file_stream(
        &self,
        file_id: &str,
        credential: Option<&Credential>,
    ) -> Result<(Option<u64>, ByteStream)> {
        let response = self
            .get(&self.config.file_url(file_id), credential)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }

        let total_size = response.content_length();
        let stream = response
            .bytes_stream()
            .map_err(ApiError::RequestError)
            .boxed();

        Ok((total_size, stream))
    }
}
