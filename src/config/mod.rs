//! Configuration loading for the GitHub sync service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `GHSYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, fmt, net::SocketAddr, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "GHSYNC_";
const REDACTED: &str = "[REDACTED]";

/// How `GET /integration` responds to a submitted authorization code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Acknowledge immediately and run the sync as a background job.
    #[default]
    Async,
    /// Run the sync inside the request and return the summary.
    Sync,
}

impl FromStr for SyncMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "async" => Ok(SyncMode::Async),
            "sync" => Ok(SyncMode::Sync),
            other => Err(ConfigError::InvalidSyncMode {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Async => f.write_str("async"),
            SyncMode::Sync => f.write_str("sync"),
        }
    }
}

/// Application configuration derived from `GHSYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_client_secret: Option<String>,
    #[serde(default = "default_github_oauth_base")]
    pub github_oauth_base: String,
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
    #[serde(default = "default_github_user_agent")]
    pub github_user_agent: String,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Sync engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// `async` acknowledges `GET /integration` immediately; `sync` blocks until done.
    ///
    /// Environment variable: `GHSYNC_SYNC_MODE`
    #[serde(default)]
    pub mode: SyncMode,

    /// Maximum commits processed per repository per run (default: 100)
    ///
    /// Environment variable: `GHSYNC_SYNC_COMMITS_CAP`
    #[serde(default = "default_commits_cap")]
    pub commits_cap: usize,

    /// Maximum issues processed per repository per run (default: 500)
    ///
    /// Environment variable: `GHSYNC_SYNC_ISSUES_CAP`
    #[serde(default = "default_issues_cap")]
    pub issues_cap: usize,

    /// Maximum pull requests processed per repository per run (default: 500)
    ///
    /// Environment variable: `GHSYNC_SYNC_PULLS_CAP`
    #[serde(default = "default_pulls_cap")]
    pub pulls_cap: usize,

    /// Reject a submission while another run for the same identity is active
    ///
    /// Environment variable: `GHSYNC_SYNC_REJECT_CONCURRENT`
    #[serde(default = "default_reject_concurrent")]
    pub reject_concurrent: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            commits_cap: default_commits_cap(),
            issues_cap: default_issues_cap(),
            pulls_cap: default_pulls_cap(),
            reject_concurrent: default_reject_concurrent(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("commits", self.commits_cap),
            ("issues", self.issues_cap),
            ("pulls", self.pulls_cap),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidSyncCap {
                    resource: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            crypto_key: None,
            github_client_id: None,
            github_client_secret: None,
            github_oauth_base: default_github_oauth_base(),
            github_api_base: default_github_api_base(),
            github_user_agent: default_github_user_agent(),
            sync: SyncConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.api_bind_addr
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: self.api_bind_addr.clone(),
                source,
            })
    }

    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.crypto_key.is_some() {
            config.crypto_key = Some(REDACTED.as_bytes().to_vec());
        }
        if config.github_client_id.is_some() {
            config.github_client_id = Some(REDACTED.to_string());
        }
        if config.github_client_secret.is_some() {
            config.github_client_secret = Some(REDACTED.to_string());
        }
        config.database_url = redact_url_password(&config.database_url);
        serde_json::to_string_pretty(&config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.crypto_key {
            Some(ref key) if key.len() != 32 => {
                return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
            }
            Some(_) => {}
            None => return Err(ConfigError::MissingCryptoKey),
        }

        // Local and test profiles may run against mocked GitHub endpoints.
        if !matches!(self.profile.as_str(), "local" | "test") {
            if self.github_client_id.is_none() {
                return Err(ConfigError::MissingGitHubClientId);
            }
            if self.github_client_secret.is_none() {
                return Err(ConfigError::MissingGitHubClientSecret);
            }
        }

        for (field, value) in [
            ("GITHUB_OAUTH_BASE", &self.github_oauth_base),
            ("GITHUB_API_BASE", &self.github_api_base),
        ] {
            url::Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
                field: field.to_string(),
                value: value.clone(),
                source,
            })?;
        }

        self.sync.validate()?;
        self.bind_addr()?;

        Ok(())
    }
}

fn redact_url_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some(REDACTED));
            parsed.to_string()
        }
        _ => raw.to_string(),
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgresql://localhost:5432/github_sync".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_github_oauth_base() -> String {
    "https://github.com".to_string()
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_github_user_agent() -> String {
    format!("github-sync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_commits_cap() -> usize {
    100
}

fn default_issues_cap() -> usize {
    500
}

fn default_pulls_cap() -> usize {
    500
}

fn default_reject_concurrent() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("crypto key is missing; set GHSYNC_CRYPTO_KEY environment variable")]
    MissingCryptoKey,
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("GitHub client ID is missing; set GHSYNC_GITHUB_CLIENT_ID environment variable")]
    MissingGitHubClientId,
    #[error(
        "GitHub client secret is missing; set GHSYNC_GITHUB_CLIENT_SECRET environment variable"
    )]
    MissingGitHubClientSecret,
    #[error("invalid URL for {field} '{value}': {source}")]
    InvalidUrl {
        field: String,
        value: String,
        source: url::ParseError,
    },
    #[error("sync mode must be 'async' or 'sync', got '{value}'")]
    InvalidSyncMode { value: String },
    #[error("sync cap for {resource} must be positive")]
    InvalidSyncCap { resource: String },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_non_empty(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_bind_addr =
            take_non_empty(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take_non_empty(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format =
            take_non_empty(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url =
            take_non_empty(&mut layered, "DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = take_parsed(&mut layered, "DB_MAX_CONNECTIONS")?
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take_parsed(&mut layered, "DB_ACQUIRE_TIMEOUT_MS")?
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let crypto_key = match take_non_empty(&mut layered, "CRYPTO_KEY") {
            Some(key_str) => {
                use base64::{Engine as _, engine::general_purpose};
                let decoded = general_purpose::STANDARD
                    .decode(key_str.trim())
                    .map_err(|e| ConfigError::InvalidCryptoKeyBase64 {
                        error: e.to_string(),
                    })?;
                Some(decoded)
            }
            None => None,
        };

        let github_client_id = take_non_empty(&mut layered, "GITHUB_CLIENT_ID");
        let github_client_secret = take_non_empty(&mut layered, "GITHUB_CLIENT_SECRET");
        let github_oauth_base = take_non_empty(&mut layered, "GITHUB_OAUTH_BASE")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(default_github_oauth_base);
        let github_api_base = take_non_empty(&mut layered, "GITHUB_API_BASE")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(default_github_api_base);
        let github_user_agent = take_non_empty(&mut layered, "GITHUB_USER_AGENT")
            .unwrap_or_else(default_github_user_agent);

        let mode = match take_non_empty(&mut layered, "SYNC_MODE") {
            Some(raw) => raw.parse()?,
            None => SyncMode::default(),
        };
        let sync = SyncConfig {
            mode,
            commits_cap: take_parsed(&mut layered, "SYNC_COMMITS_CAP")?
                .unwrap_or_else(default_commits_cap),
            issues_cap: take_parsed(&mut layered, "SYNC_ISSUES_CAP")?
                .unwrap_or_else(default_issues_cap),
            pulls_cap: take_parsed(&mut layered, "SYNC_PULLS_CAP")?
                .unwrap_or_else(default_pulls_cap),
            reject_concurrent: take_parsed(&mut layered, "SYNC_REJECT_CONCURRENT")?
                .unwrap_or_else(default_reject_concurrent),
        };

        Ok(AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            crypto_key,
            github_client_id,
            github_client_secret,
            github_oauth_base,
            github_api_base,
            github_user_agent,
            sync,
        })
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{}PROFILE", ENV_PREFIX))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_non_empty(values: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    values
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_parsed<T: FromStr>(
    values: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match take_non_empty(values, key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: format!("{}{}", ENV_PREFIX, key),
                value: raw,
            }),
        None => Ok(None),
    }
}
