//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Public origin the browser sees (e.g., "https://app.example.com")
    ///
    /// Every redirect issued by the service is absolute against this origin,
    /// including the OAuth return address.
    pub base_url: String,
}

impl ServerConfig {
    /// Join a root-relative path onto the public origin.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Identity backend (GoTrue auth API) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Project URL, e.g. "https://abcd.supabase.co"
    pub url: String,
    /// Publishable (anon) API key sent as `apikey`
    pub publishable_key: String,
    /// OAuth provider the sign-in button targets
    pub provider: String,
    /// Request timeout for backend calls
    pub timeout_seconds: u64,
}

/// Session cookie and auth route configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base name of the session cookie (chunks are `<name>.0`, `<name>.1`, ...)
    pub cookie_name: String,
    /// Maximum characters per session cookie chunk (default: 3180)
    ///
    /// Counted before percent-encoding. Quotes and non-ASCII characters
    /// grow on the wire (`"` to 3 bytes, a CJK character to 9), so a chunk of
    /// such text can exceed the ~4 KB browsers accept per cookie. Lower this
    /// when user metadata is mostly non-ASCII.
    pub chunk_size: usize,
    /// Session cookie max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
    /// Path of the OAuth callback route
    pub callback_path: String,
    /// Where the callback lands when no `next` is given
    pub default_next: String,
    /// Error page every failed sign-in converges on
    pub error_path: String,
    /// Where unauthenticated visitors of protected pages are sent
    pub home_path: String,
}

impl AuthConfig {
    /// Cookie holding the PKCE code verifier between sign-in and callback
    pub fn code_verifier_cookie_name(&self) -> String {
        format!("{}-code-verifier", self.cookie_name)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (AUTHBRIDGE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.base_url", "http://localhost:3000")?
            .set_default("backend.provider", "google")?
            .set_default("backend.timeout_seconds", 30)?
            .set_default("auth.cookie_name", "sb-auth-token")?
            .set_default("auth.chunk_size", 3180)?
            .set_default("auth.session_max_age", 604800)?
            .set_default("auth.callback_path", "/auth/callback")?
            .set_default("auth.default_next", "/protected")?
            .set_default("auth.error_path", "/auth/auth-code-error")?
            .set_default("auth.home_path", "/")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("AUTHBRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        parse_http_url("server.base_url", &self.server.base_url)?;
        parse_http_url("backend.url", &self.backend.url)?;

        if self.backend.publishable_key.trim().is_empty() {
            return Err(AppError::Config(
                "backend.publishable_key must not be empty".to_string(),
            ));
        }

        if self.backend.provider.trim().is_empty() {
            return Err(AppError::Config(
                "backend.provider must not be empty".to_string(),
            ));
        }

        if !is_valid_cookie_name(&self.auth.cookie_name) {
            return Err(AppError::Config(format!(
                "auth.cookie_name {:?} is not a valid cookie name",
                self.auth.cookie_name
            )));
        }

        if self.auth.chunk_size == 0 {
            return Err(AppError::Config(
                "auth.chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.auth.session_max_age <= 0 {
            return Err(AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        for (key, path) in [
            ("auth.callback_path", &self.auth.callback_path),
            ("auth.default_next", &self.auth.default_next),
            ("auth.error_path", &self.auth.error_path),
            ("auth.home_path", &self.auth.home_path),
        ] {
            if !path.starts_with('/') {
                return Err(AppError::Config(format!("{key} must start with '/'")));
            }
        }

        Ok(())
    }

    /// Whether the public origin is plain http on a non-local host
    pub fn uses_insecure_public_origin(&self) -> bool {
        url::Url::parse(&self.server.base_url)
            .map(|url| {
                url.scheme() == "http" && !is_local_host(url.host_str().unwrap_or_default())
            })
            .unwrap_or(false)
    }
}

fn parse_http_url(key: &str, value: &str) -> Result<url::Url, crate::error::AppError> {
    let url = url::Url::parse(value)
        .map_err(|e| crate::error::AppError::Config(format!("{key}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(crate::error::AppError::Config(format!(
            "{key} must be an http or https URL"
        )));
    }

    Ok(url)
}

fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && !matches!(c, ';' | '=' | ',' | '"' | '\\'))
}

fn is_local_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    let unbracketed = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = unbracketed.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
impl AppConfig {
    /// Local development configuration with a placeholder backend.
    pub(crate) fn for_tests() -> Self {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                base_url: "http://localhost:3000".to_string(),
            },
            backend: BackendConfig {
                url: "https://project.supabase.co".to_string(),
                publishable_key: "anon-key".to_string(),
                provider: "google".to_string(),
                timeout_seconds: 30,
            },
            auth: AuthConfig {
                cookie_name: "sb-auth-token".to_string(),
                chunk_size: 3180,
                session_max_age: 604_800,
                callback_path: "/auth/callback".to_string(),
                default_next: "/protected".to_string(),
                error_path: "/auth/auth-code-error".to_string(),
                home_path: "/".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
