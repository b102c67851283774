//! Configuration management for Asset Relay Server

use std::env;
use std::time::Duration;

/// Configuration errors are fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GithubConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Repository folder that published assets land under
    pub asset_root: String,
    /// Idle time after which an uncommitted session is discarded
    pub session_ttl: Duration,
    /// Interval between expiry sweeps
    pub sweep_interval: Duration,
    /// Request body limit for the upload endpoint
    pub max_body_bytes: usize,
}

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_ASSET_ROOT: &str = "public/assets";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_SWEEP_SECS: u64 = 300;
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            asset_root: DEFAULT_ASSET_ROOT.to_string(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            },
            github: GithubConfig {
                api_url: lookup("GITHUB_API_URL")
                    .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                owner: required("OWNER")?,
                repo: required("REPO")?,
                branch: required("BRANCH")?,
                token: required("GITHUB_TOKEN")?,
            },
            upload: UploadConfig {
                asset_root: lookup("ASSET_ROOT")
                    .unwrap_or_else(|| DEFAULT_ASSET_ROOT.to_string())
                    .trim_matches('/')
                    .to_string(),
                session_ttl: Duration::from_secs(parse_or(
                    &lookup,
                    "SESSION_TTL_SECS",
                    DEFAULT_SESSION_TTL_SECS,
                )?),
                sweep_interval: Duration::from_secs(parse_positive(
                    &lookup,
                    "SESSION_SWEEP_SECS",
                    DEFAULT_SWEEP_SECS,
                )?),
                max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            },
        })
    }
}

#[cfg(test)]
impl Config {
    /// Config pointing at a placeholder repository
    pub(crate) fn for_tests() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            github: GithubConfig {
                api_url: DEFAULT_API_URL.to_string(),
                owner: "octo".to_string(),
                repo: "site".to_string(),
                branch: "main".to_string(),
                token: "t0ken".to_string(),
            },
            upload: UploadConfig::default(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Like [`parse_or`], but zero is rejected
fn parse_positive<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, name, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        }),
        value => Ok(value),
    }
}
