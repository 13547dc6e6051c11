//! Session configuration (code > env > defaults).

use std::path::PathBuf;
use std::time::Duration;

use crate::auth::api::{REFRESH_TOKEN_PATH, SEND_OTP_PATH, VERIFY_OTP_PATH};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Settings shared by the pipeline, refresh coordinator and bootstrapper.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use homebase::config::SessionConfig;
///
/// let config = SessionConfig::new("https://api.example.com")
///     .with_request_timeout(Duration::from_secs(10));
/// assert_eq!(config.refresh_url(), "https://api.example.com/auth/refreshtoken");
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    base_url: String,
    request_timeout: Duration,
    expiry_margin: Duration,
    unauthenticated_paths: Vec<String>,
    refresh_path: String,
    token_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
            unauthenticated_paths: [SEND_OTP_PATH, VERIFY_OTP_PATH, REFRESH_TOKEN_PATH]
                .iter()
                .map(|path| path.to_string())
                .collect(),
            refresh_path: REFRESH_TOKEN_PATH.to_string(),
            token_dir: None,
        }
    }

    /// Load from environment variables, reading `.env` first if present.
    ///
    /// `HOMEBASE_API_URL`, `HOMEBASE_REQUEST_TIMEOUT_SECS`,
    /// `HOMEBASE_EXPIRY_MARGIN_SECS`, `HOMEBASE_TOKEN_DIR`. Unparseable
    /// numbers keep their defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new(lookup("HOMEBASE_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()));
        if let Some(secs) = parse_secs(lookup("HOMEBASE_REQUEST_TIMEOUT_SECS")) {
            config.request_timeout = secs;
        }
        if let Some(secs) = parse_secs(lookup("HOMEBASE_EXPIRY_MARGIN_SECS")) {
            config.expiry_margin = secs;
        }
        if let Some(dir) = lookup("HOMEBASE_TOKEN_DIR").filter(|dir| !dir.trim().is_empty()) {
            config.token_dir = Some(PathBuf::from(dir));
        }
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(base_url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    pub fn with_token_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_dir = Some(dir.into());
        self
    }

    /// Add a path that is sent without a bearer header and never refreshed.
    pub fn with_unauthenticated_path(mut self, path: impl Into<String>) -> Self {
        let path = normalize_path(&path.into());
        if !self.unauthenticated_paths.contains(&path) {
            self.unauthenticated_paths.push(path);
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn expiry_margin(&self) -> Duration {
        self.expiry_margin
    }

    pub fn token_dir(&self) -> Option<&PathBuf> {
        self.token_dir.as_ref()
    }

    pub fn unauthenticated_paths(&self) -> &[String] {
        &self.unauthenticated_paths
    }

    /// Whether `path` (query string ignored) is on the allow-list.
    pub fn is_unauthenticated(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.unauthenticated_paths.iter().any(|allowed| *allowed == path)
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    pub fn refresh_url(&self) -> String {
        self.url_for(&self.refresh_path)
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default().trim();
    let path = path.trim_end_matches('/');
    if path.starts_with('/') {
        path.to_ascii_lowercase()
    } else {
        format!("/{}", path.to_ascii_lowercase())
    }
}

fn parse_secs(value: Option<String>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}
