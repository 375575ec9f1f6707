// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup and then
//! passed explicitly (as `Arc`) to the components that need it. A
//! process-wide default client configuration is available through
//! [`ClientConfig::shared`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `API_BASE_URL` | Backend base URL used by the client | `http://localhost:5000/api` |
//! | `CLIENT_TIMEOUT_SECS` | Client request timeout | `10` |
//! | `SESSION_DIR` | Directory for the file-backed token store | unset (in-memory) |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `5000` |
//! | `JWT_SECRET` | HS256 signing secret for access tokens | Required for production |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `900` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `1209600` (14 days) |
//! | `RESET_TOKEN_TTL_SECS` | Password reset token lifetime | `3600` |
//! | `SEED_ADMIN_EMAIL` | Email of an admin account created at startup | unset |
//! | `SEED_ADMIN_PASSWORD` | Password of the seeded admin | unset |
//! | `EXPOSE_RESET_TOKENS` | Echo reset tokens in forgot-password responses | `false` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const API_BASE_URL_ENV: &str = "API_BASE_URL";
pub const CLIENT_TIMEOUT_ENV: &str = "CLIENT_TIMEOUT_SECS";
pub const SESSION_DIR_ENV: &str = "SESSION_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const RESET_TOKEN_TTL_ENV: &str = "RESET_TOKEN_TTL_SECS";
pub const SEED_ADMIN_EMAIL_ENV: &str = "SEED_ADMIN_EMAIL";
pub const SEED_ADMIN_PASSWORD_ENV: &str = "SEED_ADMIN_PASSWORD";
pub const EXPOSE_RESET_TOKENS_ENV: &str = "EXPOSE_RESET_TOKENS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_ACCESS_TTL_SECS: i64 = 900;
const DEFAULT_REFRESH_TTL_SECS: i64 = 14 * 24 * 3600;
const DEFAULT_RESET_TTL_SECS: i64 = 3600;

/// Secret used when `JWT_SECRET` is unset. Only acceptable for local runs.
const DEVELOPMENT_JWT_SECRET: &str = "academic-hub-development-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid URL in {var}: {message}")]
    InvalidUrl { var: &'static str, message: String },
    #[error("invalid number in {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },
}

/// A development-only account that logs in without contacting the backend.
#[cfg(feature = "dev")]
#[derive(Debug, Clone)]
pub struct DevAccount {
    pub email: String,
    pub password: String,
    pub user: crate::models::User,
}

/// Client-side configuration shared by the HTTP client, controller and guards.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every API path is resolved against. Always ends with `/`.
    pub api_base_url: Url,
    /// Per-request timeout applied by the transport.
    pub request_timeout: Duration,
    /// Where unauthenticated users are sent by protected routes.
    pub login_path: String,
    /// Where users lacking a role or permission are sent.
    pub unauthorized_path: String,
    /// Landing path after login when no redirect target was remembered.
    pub default_path: String,
    /// Directory for the file-backed token store, if any.
    pub session_dir: Option<PathBuf>,
    #[cfg(feature = "dev")]
    pub dev_accounts: Vec<DevAccount>,
}

static SHARED_CLIENT_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: normalize_base(
                Url::parse(DEFAULT_API_BASE_URL).expect("default base URL is valid"),
            ),
            request_timeout: DEFAULT_CLIENT_TIMEOUT,
            login_path: "/login".to_string(),
            unauthorized_path: "/unauthorized".to_string(),
            default_path: "/dashboard".to_string(),
            session_dir: None,
            #[cfg(feature = "dev")]
            dev_accounts: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Build a configuration pointing at the given base URL.
    pub fn with_base_url(base: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(base).map_err(|e| ConfigError::InvalidUrl {
            var: API_BASE_URL_ENV,
            message: e.to_string(),
        })?;
        Ok(Self {
            api_base_url: normalize_base(url),
            ..Self::default()
        })
    }

    /// Load the client configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(API_BASE_URL_ENV) {
            Ok(base) => Self::with_base_url(&base)?,
            Err(_) => Self::default(),
        };

        if let Some(secs) = parse_env_number::<u64>(CLIENT_TIMEOUT_ENV)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.session_dir = std::env::var(SESSION_DIR_ENV).ok().map(PathBuf::from);

        Ok(config)
    }

    /// Process-wide default configuration, created once on first use.
    ///
    /// Falls back to built-in defaults if the environment is invalid.
    pub fn shared() -> Arc<ClientConfig> {
        SHARED_CLIENT_CONFIG
            .get_or_init(|| Arc::new(Self::or_default(Self::from_env())))
            .clone()
    }

    fn or_default(loaded: Result<Self, ConfigError>) -> Self {
        loaded.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid client configuration, using defaults");
            Self::default()
        })
    }

    /// Resolve an API path (e.g. `/auth/login`) against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.api_base_url.join(path.trim_start_matches('/'))
    }

    #[cfg(feature = "dev")]
    pub fn with_dev_account(mut self, account: DevAccount) -> Self {
        self.dev_accounts.push(account);
        self
    }
}

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub reset_token_ttl: chrono::Duration,
    pub seed_admin: Option<(String, String)>,
    pub expose_reset_tokens: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
            access_token_ttl: chrono::Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_token_ttl: chrono::Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
            reset_token_ttl: chrono::Duration::seconds(DEFAULT_RESET_TTL_SECS),
            seed_admin: None,
            expose_reset_tokens: false,
        }
    }
}

impl ServerConfig {
    /// Load the server configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var(HOST_ENV) {
            config.host = host;
        }
        if let Some(port) = parse_env_number::<u16>(PORT_ENV)? {
            config.port = port;
        }
        match std::env::var(JWT_SECRET_ENV) {
            Ok(secret) if !secret.is_empty() => config.jwt_secret = secret,
            _ => tracing::warn!("JWT_SECRET not set, using the development signing secret"),
        }
        if let Some(secs) = parse_env_number::<i64>(ACCESS_TOKEN_TTL_ENV)? {
            config.access_token_ttl = chrono::Duration::seconds(secs);
        }
        if let Some(secs) = parse_env_number::<i64>(REFRESH_TOKEN_TTL_ENV)? {
            config.refresh_token_ttl = chrono::Duration::seconds(secs);
        }
        if let Some(secs) = parse_env_number::<i64>(RESET_TOKEN_TTL_ENV)? {
            config.reset_token_ttl = chrono::Duration::seconds(secs);
        }
        if let (Ok(email), Ok(password)) = (
            std::env::var(SEED_ADMIN_EMAIL_ENV),
            std::env::var(SEED_ADMIN_PASSWORD_ENV),
        ) {
            config.seed_admin = Some((email, password));
        }
        config.expose_reset_tokens = std::env::var(EXPOSE_RESET_TOKENS_ENV)
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `Url::join` drops the last segment unless the base ends with `/`.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn parse_env_number<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(None),
    }
}
