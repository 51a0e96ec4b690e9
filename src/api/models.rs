use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://pixeldrain.com/api";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36 Edg/140.0.0.0";

/// Response from the /file/{id}/info endpoint
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ApiConfig {
    pub fn file_url(&self, file_id: &str) -> String {
        format!("{}/file/{}", self.base_url.trim_end_matches('/'), file_id)
    }

    pub fn info_url(&self, file_id: &str) -> String {
        format!("{}/info", self.file_url(file_id))
    }
}
