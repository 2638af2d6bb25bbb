//! Load endpoint config from a JSON string or file, and process settings from the environment.

use crate::config::{EndpointConfig, EndpointsFile};
use crate::error::ConfigError;
use std::path::Path;

pub fn load_from_str(raw: &str) -> Result<Vec<EndpointConfig>, ConfigError> {
    let file: EndpointsFile =
        serde_json::from_str(raw).map_err(|e| ConfigError::Load(format!("endpoints: {}", e)))?;
    Ok(file.into_endpoints())
}

pub async fn load_from_path(path: impl AsRef<Path>) -> Result<Vec<EndpointConfig>, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let endpoints = load_from_str(&raw)?;
    tracing::info!(path = %path.display(), count = endpoints.len(), "endpoint config loaded");
    Ok(endpoints)
}

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;
pub const DEFAULT_DB_SCHEMA: &str = "public";

/// Process settings. Call `dotenvy::dotenv()` before [`Settings::from_env`] to pick up `.env`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Selects the PostgreSQL backend when set.
    pub database_url: Option<String>,
    pub db_schema: String,
    pub bind_addr: String,
    pub endpoints_path: Option<String>,
    /// JSON object of token -> claims for the static authorizer.
    pub auth_tokens_path: Option<String>,
    pub body_limit_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let body_limit_bytes = match get("BODY_LIMIT_BYTES") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Load(format!("BODY_LIMIT_BYTES is not a number: {}", v)))?,
            None => DEFAULT_BODY_LIMIT_BYTES,
        };
        Ok(Settings {
            database_url: get("DATABASE_URL"),
            db_schema: get("DB_SCHEMA").unwrap_or_else(|| DEFAULT_DB_SCHEMA.into()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            endpoints_path: get("ENDPOINTS_PATH"),
            auth_tokens_path: get("AUTH_TOKENS_PATH"),
            body_limit_bytes,
        })
    }
}
