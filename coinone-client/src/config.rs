//! Client configuration

use std::fmt;
use std::path::{Path, PathBuf};

use coinone_http::ProxySettings;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use url::Url;

use crate::{ClientError, ClientResult};

pub const DEFAULT_API_URL: &str = "https://api.coinone.co.kr";
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

pub const ENV_API_URL: &str = "COINONE_API_URL";
pub const ENV_ACCESS_KEY: &str = "COINONE_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "COINONE_SECRET_KEY";

/// Coinone client configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(serialize_with = "serialize_secret")]
    pub access_key: SecretString,
    #[serde(serialize_with = "serialize_secret")]
    pub secret_key: SecretString,
    /// Socket read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxySettings>,
    /// Drop errors raised while closing streams after a successful exchange
    #[serde(default = "default_ignore_close_errors")]
    pub ignore_close_errors: bool,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_ignore_close_errors() -> bool {
    true
}

fn serialize_secret<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("access_key", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("proxy", &self.proxy)
            .field("ignore_close_errors", &self.ignore_close_errors)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(String::new(), String::new())
    }
}

impl ClientConfig {
    /// Configuration for the public API host with the given credentials
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_url: default_api_url(),
            access_key: SecretString::new(access_key.into()),
            secret_key: SecretString::new(secret_key.into()),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            proxy: None,
            ignore_close_errors: true,
        }
    }

    /// Read credentials from `COINONE_ACCESS_KEY` and `COINONE_SECRET_KEY`;
    /// `COINONE_API_URL` overrides the host when set
    pub fn from_env() -> ClientResult<Self> {
        let required = |name: &str| {
            std::env::var(name).map_err(|_| ClientError::Config(format!("environment variable {name} is not set")))
        };
        let mut config = Self::new(required(ENV_ACCESS_KEY)?, required(ENV_SECRET_KEY)?);
        if let Ok(api_url) = std::env::var(ENV_API_URL) {
            config.api_url = api_url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content).map_err(|e| ClientError::Toml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> ClientResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ClientError::Toml(e.to_string()))?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default configuration directory
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_default().join("coinone")
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Validate configuration
    pub fn validate(&self) -> ClientResult<()> {
        if self.api_url.trim().is_empty() {
            return Err(ClientError::Config("API URL cannot be empty".to_string()));
        }

        Url::parse(&self.api_url).map_err(|e| ClientError::Config(format!("invalid API URL {}: {e}", self.api_url)))?;

        if self.read_timeout_ms == 0 {
            return Err(ClientError::Config("read timeout cannot be zero".to_string()));
        }

        if let Some(proxy) = &self.proxy {
            if proxy.host.trim().is_empty() {
                return Err(ClientError::Config("proxy host cannot be empty".to_string()));
            }
            if proxy.port == 0 {
                return Err(ClientError::Config("proxy port cannot be zero".to_string()));
            }
        }

        Ok(())
    }

    /// Whether both keys are present
    pub fn has_credentials(&self) -> bool {
        !self.access_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }
}
