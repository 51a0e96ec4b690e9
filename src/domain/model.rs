use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// API key used for authenticated, unthrottled downloads.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for blank keys so an empty config entry means "no key".
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Everything one invocation needs to fetch a file.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub file_id: String,
    pub credential: Option<Credential>,
    /// Directory the file is streamed into. `None` means the working directory.
    pub temp_dir: Option<PathBuf>,
    /// Directory the finished file is moved to.
    pub download_dir: Option<PathBuf>,
    /// KB/s below which an unauthenticated transfer is abandoned.
    pub min_speed_kbps: f64,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl DownloadRequest {
    pub fn without_credential(&self) -> Self {
        Self {
            credential: None,
            ..self.clone()
        }
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { filename: String, path: PathBuf },
    LowSpeed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    /// Phase 1: no API key, speed gated.
    Anonymous,
    /// Phase 2: API key attached, never speed gated.
    Authenticated,
}

impl DownloadPhase {
    pub fn number(&self) -> u8 {
        match self {
            DownloadPhase::Anonymous => 1,
            DownloadPhase::Authenticated => 2,
        }
    }
}

impl fmt::Display for DownloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadPhase::Anonymous => f.write_str("Phase 1: Download without API key"),
            DownloadPhase::Authenticated => f.write_str("Phase 2: Download with API key"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DownloadRequest {
        DownloadRequest {
            file_id: "abc123".to_string(),
            credential: Credential::new("secret"),
            temp_dir: None,
            download_dir: None,
            min_speed_kbps: 1536.0,
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_blank_credential_is_absent() {
        assert!(Credential::new("").is_none());
        assert!(Credential::new("   ").is_none());
        assert_eq!(Credential::new(" key ").unwrap().expose(), "key");
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let debug = format!("{:?}", request());
        assert!(!debug.contains("secret"));
        assert!(debug.contains("Credential(***)"));
    }

    #[test]
    fn test_without_credential_keeps_other_fields() {
        let original = request();
        let stripped = original.without_credential();
        assert!(original.has_credential());
        assert!(!stripped.has_credential());
        assert_eq!(stripped.file_id, "abc123");
        assert_eq!(stripped.max_attempts, 3);
    }
}
