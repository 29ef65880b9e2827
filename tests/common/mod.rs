//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use authbridge::auth::{CookieWriter, Session, User};
use authbridge::backend::IdentityBackend;
use authbridge::error::{AppError, Result};
use authbridge::{AppState, config};
use axum_extra::extract::cookie::Cookie;
use serde_json::json;
use tokio::net::TcpListener;

pub const COOKIE_NAME: &str = "sb-auth-token";
pub const VERIFIER_COOKIE_NAME: &str = "sb-auth-token-code-verifier";

/// In-process identity backend
///
/// Codes registered with [`FakeBackend::register_code`] exchange for their
/// session; the code `"empty"` exchanges for no session; anything else is
/// rejected.
#[derive(Default)]
pub struct FakeBackend {
    codes: Mutex<HashMap<String, Session>>,
    revoked: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn register_code(&self, code: &str, session: Session) {
        self.codes
            .lock()
            .unwrap()
            .insert(code.to_string(), session);
    }

    pub fn revoked_tokens(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityBackend for FakeBackend {
    async fn authorize_url(
        &self,
        provider: &str,
        redirect_to: &str,
        cookies: &mut CookieWriter,
    ) -> Result<Option<String>> {
        cookies.set(
            Cookie::build((VERIFIER_COOKIE_NAME, "test-verifier"))
                .path("/")
                .http_only(true)
                .build(),
        );

        let url = url::Url::parse_with_params(
            "https://idp.test/authorize",
            &[("provider", provider), ("redirect_to", redirect_to)],
        )
        .expect("valid idp url");

        Ok(Some(url.into()))
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        cookies: &mut CookieWriter,
    ) -> Result<Option<Session>> {
        if code == "empty" {
            return Ok(None);
        }

        let session = self.codes.lock().unwrap().get(code).cloned();
        match session {
            Some(session) => {
                cookies.remove(VERIFIER_COOKIE_NAME);
                Ok(Some(session))
            }
            None => Err(AppError::Backend("invalid grant".to_string())),
        }
    }

    async fn get_user(&self, cookies: &CookieWriter) -> Result<Option<User>> {
        let Some(session) = cookies.session(COOKIE_NAME) else {
            return Ok(None);
        };

        if self.revoked.lock().unwrap().contains(&session.access_token) {
            return Ok(None);
        }

        let known = self
            .codes
            .lock()
            .unwrap()
            .values()
            .any(|s| s.access_token == session.access_token);

        Ok(known.then_some(session.user))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.revoked.lock().unwrap().push(access_token.to_string());
        Ok(())
    }
}

/// Session whose user carries `padding` extra characters of metadata
pub fn sample_session(access_token: &str, padding: usize) -> Session {
    serde_json::from_value(json!({
        "access_token": access_token,
        "refresh_token": "refresh-token",
        "expires_at": 1_900_000_000,
        "expires_in": 3600,
        "token_type": "bearer",
        "user": {
            "id": "4f1c6c0e-1111-2222-3333-444455556666",
            "email": "ada@example.com",
            "app_metadata": {"provider": "google"},
            "user_metadata": {"full_name": "Ada Lovelace", "bio": "x".repeat(padding)}
        }
    }))
    .expect("sample session deserializes")
}

pub fn test_config() -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: "http://localhost:3000".to_string(),
        },
        backend: config::BackendConfig {
            url: "http://127.0.0.1:9".to_string(),
            publishable_key: "test-anon-key".to_string(),
            provider: "google".to_string(),
            timeout_seconds: 5,
        },
        auth: config::AuthConfig {
            cookie_name: COOKIE_NAME.to_string(),
            chunk_size: 3180,
            session_max_age: 604_800,
            callback_path: "/auth/callback".to_string(),
            default_next: "/protected".to_string(),
            error_path: "/auth/auth-code-error".to_string(),
            home_path: "/".to_string(),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub backend: Arc<FakeBackend>,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        let backend = Arc::new(FakeBackend::default());
        let state = AppState::with_backend(test_config(), backend.clone());

        // Redirects are what is under test, so never follow them.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = authbridge::build_router(state);

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            backend,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

/// `Location` header of a redirect
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

/// Every `Set-Cookie` of a response, decoded and sorted by name
pub fn set_cookies(response: &reqwest::Response) -> Vec<Cookie<'static>> {
    let mut cookies: Vec<Cookie<'static>> = response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|raw| Cookie::parse_encoded(raw.to_string()).expect("valid set-cookie"))
        .collect();
    cookies.sort_by(|a, b| a.name().cmp(b.name()));
    cookies
}

/// `Cookie` request header echoing back the cookies a response set
pub fn cookie_header(response: &reqwest::Response) -> String {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| raw.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}
