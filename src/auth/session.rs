//! Session record
//!
//! The token material and profile the identity backend returns from a
//! code exchange. Its canonical string form is compact JSON; that string
//! is what gets split across the session cookies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated user profile
///
/// `id` and `email` are typed because pages use them. Every other
/// attribute the backend sends is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Session produced by a successful code exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry, seconds since the Unix epoch
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Lifetime in seconds, relative to issuance
    pub expires_in: i64,
    pub token_type: String,
    pub user: User,
}

impl Session {
    /// Canonical compact form stored in the session cookies
    pub fn to_cookie_value(&self) -> Result<String, crate::error::AppError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the canonical form back into a session
    pub fn from_cookie_value(value: &str) -> Result<Self, crate::error::AppError> {
        Ok(serde_json::from_str(value)?)
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    /// Check if the access token is past its absolute expiry
    ///
    /// Sessions without an absolute expiry are never considered expired
    /// here; the backend has the final word.
    pub fn is_expired(&self) -> bool {
        self.expires_at_utc()
            .map(|expires_at| expires_at < Utc::now())
            .unwrap_or(false)
    }
}
