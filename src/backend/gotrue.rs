//! GoTrue auth API client
//!
//! Talks to the `/auth/v1` REST surface of a Supabase project (or any
//! GoTrue deployment) using the PKCE flow. The code verifier lives in a
//! cookie between the sign-in redirect and the callback.

use async_trait::async_trait;
use axum_extra::extract::cookie::{Cookie, SameSite};
use reqwest::StatusCode;
use serde_json::json;
use url::Url;

use super::IdentityBackend;
use super::pkce::{generate_code_challenge, generate_code_verifier};
use crate::auth::CookieWriter;
use crate::auth::session::{Session, User};
use crate::config::{AuthConfig, BackendConfig};
use crate::error::{AppError, Result};

/// How long a sign-in may take before the verifier cookie is dropped
const CODE_VERIFIER_MAX_AGE_MINUTES: i64 = 10;

/// GoTrue REST client
pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session_cookie: String,
    verifier_cookie: String,
}

impl GoTrueClient {
    /// Build a client from configuration
    ///
    /// The session cookie name is the one the callback writes, so
    /// [`IdentityBackend::get_user`] reads back exactly what was stored.
    pub fn new(backend: &BackendConfig, auth: &AuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("authbridge/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(backend.timeout_seconds))
            .build()?;

        Ok(Self::with_http_client(http, backend, auth))
    }

    pub fn with_http_client(http: reqwest::Client, backend: &BackendConfig, auth: &AuthConfig) -> Self {
        Self {
            http,
            base_url: backend.url.trim_end_matches('/').to_string(),
            api_key: backend.publishable_key.clone(),
            session_cookie: auth.cookie_name.clone(),
            verifier_cookie: auth.code_verifier_cookie_name(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/auth/v1/{}", self.base_url, path))
            .map_err(|e| AppError::Config(format!("backend.url: {e}")))
    }

    fn verifier_cookie(&self, verifier: String) -> Cookie<'static> {
        Cookie::build((self.verifier_cookie.clone(), verifier))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(time::Duration::minutes(CODE_VERIFIER_MAX_AGE_MINUTES))
            .build()
    }
}

async fn backend_error(context: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AppError::Backend(format!("{context} returned {status}: {body}"))
}

#[async_trait]
impl IdentityBackend for GoTrueClient {
    async fn authorize_url(
        &self,
        provider: &str,
        redirect_to: &str,
        cookies: &mut CookieWriter,
    ) -> Result<Option<String>> {
        let verifier = generate_code_verifier();
        let challenge = generate_code_challenge(&verifier);

        let mut url = self.endpoint("authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "s256");

        cookies.set(self.verifier_cookie(verifier));

        Ok(Some(url.into()))
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        cookies: &mut CookieWriter,
    ) -> Result<Option<Session>> {
        let verifier = cookies
            .get(&self.verifier_cookie)
            .map(str::to_owned)
            .ok_or_else(|| AppError::Backend("missing PKCE code verifier cookie".to_string()))?;

        let response = self
            .http
            .post(self.endpoint("token")?)
            .query(&[("grant_type", "pkce")])
            .header("apikey", &self.api_key)
            .json(&json!({
                "auth_code": code,
                "code_verifier": verifier,
            }))
            .send()
            .await?;

        // The verifier is single use whatever the outcome.
        cookies.remove(self.verifier_cookie.clone());

        if !response.status().is_success() {
            return Err(backend_error("token exchange", response).await);
        }

        let payload: serde_json::Value = response.json().await?;
        if payload.get("access_token").is_none() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_value(payload)?))
    }

    async fn get_user(&self, cookies: &CookieWriter) -> Result<Option<User>> {
        let Some(session) = cookies.session(&self.session_cookie) else {
            return Ok(None);
        };

        if session.is_expired() {
            tracing::debug!(cookie = %self.session_cookie, "Session cookie holds an expired access token");
            return Ok(None);
        }

        let response = self
            .http
            .get(self.endpoint("user")?)
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            _ => Err(backend_error("user lookup", response).await),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("logout")?)
            .query(&[("scope", "global")])
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // Already revoked or expired; nothing left to sign out.
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(backend_error("logout", response).await),
        }
    }
}
