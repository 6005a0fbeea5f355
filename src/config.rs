use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};

pub const API_KEYS_VAR: &str = "API_KEYS";
pub const CONNECTION_STRING_VAR: &str = "SQL_SERVER_CONNECTION_STRING";

const DEFAULT_PORT: u16 = 8000;

/// Settings for the tool executor.
#[derive(Debug, Clone, Default)]
pub struct SqlConfig {
    /// Driver connection string, `None` when unset or empty.
    pub connection_string: Option<String>,
}

impl SqlConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: non_empty(connection_string.into()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.connection_string.is_some()
    }
}

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub api_keys: Vec<String>,
    pub sql: SqlConfig,
}

impl AppConfig {
    /// Load configuration from the environment (a `.env` file is honored by `main`).
    pub fn from_env() -> Result<Self> {
        let host = match env::var("HOST").ok().and_then(non_empty) {
            Some(host) => host
                .parse::<IpAddr>()
                .with_context(|| format!("HOST must be an IP address, got {:?}", host))?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let port = match env::var("PORT").ok().and_then(non_empty) {
            Some(port) => port
                .parse::<u16>()
                .with_context(|| format!("PORT must be a number, got {:?}", port))?,
            None => DEFAULT_PORT,
        };

        let api_keys = env::var(API_KEYS_VAR)
            .map(|raw| parse_api_keys(&raw))
            .unwrap_or_default();

        let sql = SqlConfig {
            connection_string: env::var(CONNECTION_STRING_VAR).ok().and_then(non_empty),
        };

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            api_keys,
            sql,
        })
    }

    pub fn api_keys_configured(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

/// Split a comma-separated key list, dropping blanks.
pub fn parse_api_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(String::from)
        .collect()
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
