//! Environment-driven application configuration.

use std::env;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingKey(&'static str),

    #[error("{key} must be a positive integer")]
    InvalidNumber { key: &'static str },

    #[error("API_PORT must be a valid port number")]
    InvalidPort,

    #[error("API_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost { source: AddrParseError },
}

/// Top-level configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub max_concurrent_llm_calls: usize,
    pub log_level: String,
    pub schemes_dir: String,
    pub api_host: String,
    pub api_port: u16,
    /// Deadline for one evaluation request.
    pub http_timeout: Duration,
    /// Deadline per judge call.
    pub openai_timeout: Duration,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let openai_api_key =
            env::var("OPENAI_API_KEY").map_err(|_| ConfigError::MissingKey("OPENAI_API_KEY"))?;

        Ok(Self {
            openai_api_key,
            openai_model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: var_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            max_concurrent_llm_calls: parse_var("MAX_CONCURRENT_LLM_CALLS", 20)?,
            log_level: var_or("LOG_LEVEL", "info"),
            schemes_dir: var_or("SCHEMES_DIR", "schemes"),
            api_host: var_or("API_HOST", "127.0.0.1"),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8001".to_string())
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort)?,
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECONDS", 60)?),
            openai_timeout: Duration::from_secs(parse_var("OPENAI_TIMEOUT_SECONDS", 60)?),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.api_host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.api_port));
        }

        let ip: IpAddr = self
            .api_host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;
        Ok(SocketAddr::new(ip, self.api_port))
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}
