//! Client configuration and credential discovery.

use crate::error::{MoltbookError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Canonical Moltbook API base URL (must use www to avoid redirect stripping auth).
pub const DEFAULT_BASE_URL: &str = "https://www.moltbook.com/api/v1";
/// Environment variable checked before any credentials file.
pub const API_KEY_ENV: &str = "MOLTBOOK_API_KEY";

const CONNECT_TIMEOUT_SECS: u64 = 8;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY_SECS: u64 = 10;
const MAX_RETRY_DELAY_SECS: u64 = 120;

/// A resolved Moltbook API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Where to look for an API key, in precedence order.
#[derive(Debug, Clone, Default)]
pub struct CredentialSources {
    /// Value of `MOLTBOOK_API_KEY`, if set.
    pub env_key: Option<String>,
    /// Credential files, checked in order after the environment.
    pub files: Vec<PathBuf>,
}

impl CredentialSources {
    /// Standard lookup: environment, `~/.config/moltbook/credentials.json`,
    /// `./credentials.json`, then `explicit` if given.
    pub fn discover(explicit: Option<&Path>) -> Self {
        let mut files = Vec::new();
        if let Some(dir) = config_dir() {
            files.push(dir.join("credentials.json"));
        }
        if let Ok(cwd) = std::env::current_dir() {
            files.push(cwd.join("credentials.json"));
        }
        if let Some(path) = explicit {
            files.push(path.to_path_buf());
        }
        Self {
            env_key: std::env::var(API_KEY_ENV).ok(),
            files,
        }
    }

    /// Resolve the first usable key. Unreadable or malformed files are skipped.
    pub fn resolve(&self) -> Result<ApiKey> {
        let env_key = self
            .env_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        if let Some(key) = env_key {
            tracing::debug!("using API key from {API_KEY_ENV}");
            return Ok(ApiKey::new(key));
        }
        for path in &self.files {
            if let Some(key) = read_credentials_file(path) {
                tracing::debug!(path = %path.display(), "using API key from credentials file");
                return Ok(key);
            }
        }
        Err(MoltbookError::MissingCredentials {
            searched: self.files.clone(),
        })
    }
}

/// Resolve the API key from the standard locations.
pub fn resolve_api_key(explicit: Option<&Path>) -> Result<ApiKey> {
    CredentialSources::discover(explicit).resolve()
}

fn read_credentials_file(path: &Path) -> Option<ApiKey> {
    let contents = std::fs::read_to_string(path).ok()?;
    let json: serde_json::Value = serde_json::from_str(&contents).ok()?;
    let key = json.get("api_key")?.as_str()?.trim();
    if key.is_empty() {
        return None;
    }
    Some(ApiKey::new(key))
}

/// `~/.config/moltbook`, shared by credentials and tracker state.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("moltbook"))
}

/// Default location of a named state file under the config directory.
pub fn default_state_path(file_name: &str) -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(file_name))
}

/// Bounded retry behaviour for throttled or transiently failing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total requests per call, including the first. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Wait used when the server gives no `Retry-After`.
    pub default_delay: Duration,
    /// Upper bound on any single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            default_delay: Duration::from_secs(RETRY_DELAY_SECS),
            max_delay: Duration::from_secs(MAX_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the next attempt, honoring a server hint when present.
    pub fn delay_for(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.default_delay)
            .min(self.max_delay)
    }
}

/// Settings for [`crate::MoltbookClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_creds(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).expect("write credentials");
        path
    }

    #[test]
    fn env_key_wins_over_files() {
        let dir = TempDir::new().unwrap();
        let file = write_creds(&dir, "a.json", r#"{"api_key": "from_file"}"#);
        let sources = CredentialSources {
            env_key: Some("from_env".to_string()),
            files: vec![file],
        };
        assert_eq!(sources.resolve().unwrap().expose(), "from_env");
    }

    #[test]
    fn blank_env_falls_through_to_first_valid_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        let broken = write_creds(&dir, "broken.json", "{not json");
        let keyless = write_creds(&dir, "keyless.json", r#"{"token": "x"}"#);
        let good = write_creds(&dir, "good.json", r#"{"api_key": "moltbook_abc"}"#);
        let later = write_creds(&dir, "later.json", r#"{"api_key": "ignored"}"#);
        let sources = CredentialSources {
            env_key: Some("   ".to_string()),
            files: vec![missing, broken, keyless, good, later],
        };
        assert_eq!(sources.resolve().unwrap().expose(), "moltbook_abc");
    }

    #[test]
    fn nothing_found_is_missing_credentials() {
        let dir = TempDir::new().unwrap();
        let sources = CredentialSources {
            env_key: None,
            files: vec![dir.path().join("credentials.json")],
        };
        match sources.resolve() {
            Err(MoltbookError::MissingCredentials { searched }) => {
                assert_eq!(searched.len(), 1);
            }
            other => panic!("expected MissingCredentials, got {other:?}"),
        }
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("moltbook_secret");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
    }

    #[test]
    fn retry_delay_honors_hint_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(None), Duration::from_secs(10));
        assert_eq!(
            policy.delay_for(Some(Duration::from_secs(1))),
            Duration::from_secs(1)
        );
        assert_eq!(
            policy.delay_for(Some(Duration::from_secs(3600))),
            Duration::from_secs(120)
        );
        let zero = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(zero.attempts(), 1);
    }
}
