use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable that takes precedence over `access_token` in the file
pub const ACCESS_TOKEN_ENV: &str = "TALLY_ACCESS_TOKEN";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub api_base: String,
    pub upload_base: String,
    pub timeout_secs: u64,
    /// OAuth bearer token with the `drive.appdata` scope
    pub access_token: Option<String>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            access_token: None,
        }
    }
}

impl DriveConfig {
    /// Point both endpoints at `base` (a mock server, a proxy)
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: format!("{}/drive/v3", base),
            upload_base: format!("{}/upload/drive/v3", base),
            ..Default::default()
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Apply [`ACCESS_TOKEN_ENV`] if it is set and non-empty
    pub fn with_env_overrides(self) -> Self {
        self.with_token_override(std::env::var(ACCESS_TOKEN_ENV).ok())
    }

    fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.access_token = Some(token);
        }
        self
    }
}

impl std::fmt::Debug for DriveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveConfig")
            .field("api_base", &self.api_base)
            .field("upload_base", &self.upload_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_override() {
        let config = DriveConfig::default().with_access_token("from-file");

        let kept = config.clone().with_token_override(None);
        assert_eq!(kept.access_token.as_deref(), Some("from-file"));

        let blank = config.clone().with_token_override(Some("  ".into()));
        assert_eq!(blank.access_token.as_deref(), Some("from-file"));

        let replaced = config.with_token_override(Some("from-env".into()));
        assert_eq!(replaced.access_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_base_url() {
        let config = DriveConfig::with_base_url("http://127.0.0.1:9000/");
        assert_eq!(config.api_base, "http://127.0.0.1:9000/drive/v3");
        assert_eq!(config.upload_base, "http://127.0.0.1:9000/upload/drive/v3");
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_debug_hides_token() {
        let config = DriveConfig::default().with_access_token("secret");
        assert!(!format!("{:?}", config).contains("secret"));
    }
}
