//! Runtime settings
//!
//! Configuration comes from CLI flags plus an optional two-line credentials
//! file (handled by the auth module); this module validates and carries the
//! resolved values.

use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Default portal base URL
pub const DEFAULT_BASE_URL: &str = "https://www.uaberta.unisul.br";

/// Default directory for the persisted slots
pub const DEFAULT_STATE_DIR: &str = ".sync";

/// Default destination root for downloaded files
pub const DEFAULT_DESTINATION: &str = "downloads";

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Resolved runtime settings for one crawl session
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: Url,
    pub state_dir: PathBuf,
    pub destination: PathBuf,
    pub auth_file: Option<PathBuf>,
    /// 0 means retry until the operator aborts
    pub max_login_attempts: u32,
}

impl Settings {
    pub fn new(
        base_url: &str,
        state_dir: PathBuf,
        destination: PathBuf,
        auth_file: Option<PathBuf>,
        max_login_attempts: u32,
    ) -> ConfigResult<Self> {
        let base_url = validate_base_url(base_url)?;
        Ok(Self {
            base_url,
            state_dir,
            destination,
            auth_file,
            max_login_attempts,
        })
    }
}

fn validate_base_url(raw: &str) -> ConfigResult<Url> {
    let url = Url::parse(raw).map_err(|err| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}
