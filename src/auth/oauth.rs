//! OAuth sign-in flow
//!
//! Sign-in asks the identity backend for the provider authorization URL.
//! The provider returns the browser to the callback with a code, which the
//! backend exchanges for a session. The session is then written into the
//! chunked session cookies.

use axum::{
    Json, Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::cookies::CookieWriter;
use super::middleware::MaybeUser;
use super::session::User;
use crate::AppState;
use crate::config::AuthConfig;
use crate::error::AppError;
use crate::metrics::{AUTH_CALLBACKS_TOTAL, SESSION_COOKIE_CHUNKS, SIGNIN_REDIRECTS_TOTAL, SIGNOUTS_TOTAL};

/// Create authentication router
///
/// Routes:
/// - GET|POST /auth/signin - Redirect to the identity provider
/// - GET <callback_path> - OAuth callback
/// - POST /auth/signout - Sign out
/// - GET /auth/user - Current user as JSON
pub fn auth_router(config: &AuthConfig) -> Router<AppState> {
    Router::new()
        .route("/auth/signin", get(sign_in).post(sign_in))
        .route(&config.callback_path, get(callback))
        .route("/auth/signout", post(sign_out))
        .route("/auth/user", get(current_user))
}

// =============================================================================
// Sign-in
// =============================================================================

/// GET|POST /auth/signin
///
/// Redirects the browser to the provider authorization URL. Cookies the
/// backend queues (the PKCE verifier) ride along on the redirect.
async fn sign_in(State(state): State<AppState>, jar: CookieJar) -> Response {
    let mut cookies = CookieWriter::from_jar(&jar);
    let config = &state.config;
    let redirect_to = config.server.absolute_url(&config.auth.callback_path);

    let outcome = state
        .backend
        .authorize_url(&config.backend.provider, &redirect_to, &mut cookies)
        .await;

    match outcome {
        Ok(Some(url)) => {
            SIGNIN_REDIRECTS_TOTAL.with_label_values(&["redirected"]).inc();
            tracing::debug!(provider = %config.backend.provider, "Redirecting to identity provider");
            (cookies.apply(jar), Redirect::to(&url)).into_response()
        }
        Ok(None) => {
            SIGNIN_REDIRECTS_TOTAL.with_label_values(&["no_url"]).inc();
            tracing::warn!(provider = %config.backend.provider, "Identity backend returned no authorization URL");
            error_redirect(&state).into_response()
        }
        Err(error) => {
            SIGNIN_REDIRECTS_TOTAL.with_label_values(&["failed"]).inc();
            tracing::error!(%error, provider = %config.backend.provider, "Failed to start sign-in");
            error_redirect(&state).into_response()
        }
    }
}

// =============================================================================
// Callback
// =============================================================================

/// Query parameters of the OAuth callback
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    /// Authorization code
    code: Option<String>,
    /// Page to land on after sign-in
    next: Option<String>,
}

/// Why a callback did not produce a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackFailure {
    MissingCode,
    ExchangeFailed,
    EmptySession,
    CookieWriteFailed,
}

impl CallbackFailure {
    fn as_str(self) -> &'static str {
        match self {
            CallbackFailure::MissingCode => "missing_code",
            CallbackFailure::ExchangeFailed => "exchange_failed",
            CallbackFailure::EmptySession => "empty_session",
            CallbackFailure::CookieWriteFailed => "cookie_write_failed",
        }
    }
}

/// Keep `next` on this site.
///
/// Anything that is not a root-relative path becomes `/`.
pub fn sanitize_next(next: Option<&str>, default: &str) -> String {
    let next = next.unwrap_or(default);
    if next.starts_with('/') {
        next.to_string()
    } else {
        "/".to_string()
    }
}

/// Exchange the code and queue the session cookies.
///
/// Backend cookie writes are queued first, then removal of the previous
/// session cookies, then the new session chunks.
/// Returns the number of session cookies written.
async fn complete_sign_in(
    state: &AppState,
    code: Option<&str>,
    cookies: &mut CookieWriter,
) -> Result<usize, CallbackFailure> {
    let code = code
        .filter(|code| !code.is_empty())
        .ok_or(CallbackFailure::MissingCode)?;

    let session = state
        .backend
        .exchange_code_for_session(code, cookies)
        .await
        .map_err(|error| {
            tracing::error!(%error, "Error exchanging code for session");
            CallbackFailure::ExchangeFailed
        })?
        .ok_or(CallbackFailure::EmptySession)?;

    let auth = &state.config.auth;
    // Drop whatever session the browser still holds so the new one is the
    // only one left to reassemble. Rewritten names replace their removal.
    cookies.clear_session(&auth.cookie_name);
    cookies
        .write_session(&auth.cookie_name, &session, auth.chunk_size, auth.session_max_age)
        .map_err(|error| {
            tracing::error!(%error, "Failed to serialize session into cookies");
            CallbackFailure::CookieWriteFailed
        })
}

/// GET <callback_path>
///
/// # Steps
/// 1. Sanitize `next`
/// 2. Exchange the code for a session
/// 3. Split the session across cookies
/// 4. Redirect to `next`
///
/// Every failure redirects to the error page without setting cookies.
async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let next = sanitize_next(query.next.as_deref(), &state.config.auth.default_next);
    let mut cookies = CookieWriter::from_jar(&jar);

    match complete_sign_in(&state, query.code.as_deref(), &mut cookies).await {
        Ok(chunks) => {
            AUTH_CALLBACKS_TOTAL.with_label_values(&["success"]).inc();
            SESSION_COOKIE_CHUNKS.observe(chunks as f64);
            tracing::info!(chunks, next = %next, "Sign-in completed");

            let location = state.config.server.absolute_url(&next);
            (cookies.apply(jar), Redirect::temporary(&location)).into_response()
        }
        Err(failure) => {
            AUTH_CALLBACKS_TOTAL
                .with_label_values(&[failure.as_str()])
                .inc();
            tracing::warn!(reason = failure.as_str(), "Sign-in callback failed");
            error_redirect(&state).into_response()
        }
    }
}

// =============================================================================
// Sign-out
// =============================================================================

/// POST /auth/signout
///
/// Revokes the session at the backend and clears every session cookie.
/// A failed revocation is logged; the cookies are cleared regardless.
async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let mut cookies = CookieWriter::from_jar(&jar);
    let base = &state.config.auth.cookie_name;

    match cookies.session(base) {
        Some(session) => match state.backend.sign_out(&session.access_token).await {
            Ok(()) => SIGNOUTS_TOTAL.with_label_values(&["revoked"]).inc(),
            Err(error) => {
                SIGNOUTS_TOTAL.with_label_values(&["failed"]).inc();
                tracing::warn!(%error, "Backend sign-out failed; clearing cookies anyway");
            }
        },
        None => SIGNOUTS_TOTAL.with_label_values(&["no_session"]).inc(),
    }

    cookies.clear_session(base);
    (cookies.apply(jar), Redirect::to(&state.config.auth.home_path))
}

// =============================================================================
// Current user
// =============================================================================

/// GET /auth/user
async fn current_user(MaybeUser(user): MaybeUser) -> Result<Json<User>, AppError> {
    user.map(Json).ok_or(AppError::Unauthorized)
}

// =============================================================================
// Helpers
// =============================================================================

fn error_redirect(state: &AppState) -> Redirect {
    Redirect::temporary(&state.config.server.absolute_url(&state.config.auth.error_path))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum_extra::extract::cookie::Cookie;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::session::Session;
    use crate::backend::MockIdentityBackend;
    use crate::config::AppConfig;

    fn sample_session(padding: usize) -> Session {
        serde_json::from_value(json!({
            "access_token": "access-token",
            "refresh_token": "refresh-token",
            "expires_at": 1_900_000_000,
            "expires_in": 3600,
            "token_type": "bearer",
            "user": {
                "id": "user-1",
                "email": "ada@example.com",
                "user_metadata": {"avatar": "x".repeat(padding)}
            }
        }))
        .unwrap()
    }

    fn state_with(backend: MockIdentityBackend) -> AppState {
        AppState::with_backend(AppConfig::for_tests(), Arc::new(backend))
    }

    async fn get(state: AppState, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        crate::build_router(state)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("location header")
    }

    fn set_cookies(response: &Response) -> Vec<Cookie<'static>> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse_encoded(v.to_str().unwrap().to_string()).unwrap())
            .collect()
    }

    #[test]
    fn sanitize_next_keeps_root_relative_paths() {
        assert_eq!(sanitize_next(Some("/dashboard?tab=1"), "/protected"), "/dashboard?tab=1");
        assert_eq!(sanitize_next(Some("/"), "/protected"), "/");
    }

    #[test]
    fn sanitize_next_replaces_everything_else_with_root() {
        for next in ["https://evil.example", "dashboard", "", "javascript:alert(1)"] {
            assert_eq!(sanitize_next(Some(next), "/protected"), "/", "next = {next:?}");
        }
    }

    #[test]
    fn sanitize_next_uses_default_when_absent() {
        assert_eq!(sanitize_next(None, "/protected"), "/protected");
    }

    #[tokio::test]
    async fn missing_code_redirects_to_error_page_without_cookies() {
        let mut backend = MockIdentityBackend::new();
        backend.expect_exchange_code_for_session().never();

        let response = get(state_with(backend), "/auth/callback?next=/home", None).await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "http://localhost:3000/auth/auth-code-error");
        assert!(set_cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn empty_code_counts_as_missing() {
        let mut backend = MockIdentityBackend::new();
        backend.expect_exchange_code_for_session().never();

        let response = get(state_with(backend), "/auth/callback?code=", None).await;

        assert_eq!(location(&response), "http://localhost:3000/auth/auth-code-error");
    }

    #[tokio::test]
    async fn rejected_code_redirects_to_error_page_without_cookies() {
        let mut backend = MockIdentityBackend::new();
        backend
            .expect_exchange_code_for_session()
            .withf(|code, _| code == "bad-code")
            .times(1)
            .returning(|_, cookies| {
                cookies.remove("sb-auth-token-code-verifier");
                Err(AppError::Backend("invalid grant".to_string()))
            });

        let response = get(state_with(backend), "/auth/callback?code=bad-code", None).await;

        assert_eq!(location(&response), "http://localhost:3000/auth/auth-code-error");
        assert!(set_cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn empty_session_redirects_to_error_page() {
        let mut backend = MockIdentityBackend::new();
        backend
            .expect_exchange_code_for_session()
            .returning(|_, _| Ok(None));

        let response = get(state_with(backend), "/auth/callback?code=ok", None).await;

        assert_eq!(location(&response), "http://localhost:3000/auth/auth-code-error");
        assert!(set_cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn small_session_is_written_to_one_cookie() {
        let session = sample_session(0);
        let expected = session.to_cookie_value().unwrap();
        let mut backend = MockIdentityBackend::new();
        backend
            .expect_exchange_code_for_session()
            .withf(|code, _| code == "good-code")
            .times(1)
            .returning(move |_, _| Ok(Some(session.clone())));

        let response = get(
            state_with(backend),
            "/auth/callback?code=good-code&next=/dashboard",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "http://localhost:3000/dashboard");

        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name(), "sb-auth-token");
        assert_eq!(cookies[0].value(), expected);
    }

    #[tokio::test]
    async fn large_session_is_split_into_ordinal_cookies() {
        let session = sample_session(7_000);
        let expected = session.clone();
        let mut backend = MockIdentityBackend::new();
        backend
            .expect_exchange_code_for_session()
            .returning(move |_, _| Ok(Some(session.clone())));

        let response = get(state_with(backend), "/auth/callback?code=good-code", None).await;

        assert_eq!(location(&response), "http://localhost:3000/protected");

        // Set-Cookie order is unspecified; chunk order lives in the names.
        let mut cookies = set_cookies(&response);
        cookies.sort_by(|a, b| a.name().cmp(b.name()));
        let names: Vec<&str> = cookies.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["sb-auth-token.0", "sb-auth-token.1", "sb-auth-token.2"]);
        assert!(cookies.iter().all(|c| c.value().chars().count() <= 3180));

        let joined: String = cookies.iter().map(|c| c.value()).collect();
        assert_eq!(Session::from_cookie_value(&joined).unwrap(), expected);
    }

    /// Apply a response's Set-Cookies to the cookies a browser held.
    fn browser_cookies_after(request: &[(String, String)], response: &Response) -> CookieWriter {
        let mut held: Vec<(String, String)> = request.to_vec();
        for cookie in set_cookies(response) {
            held.retain(|(name, _)| name != cookie.name());
            if cookie.max_age() != Some(time::Duration::ZERO) {
                held.push((cookie.name().to_string(), cookie.value().to_string()));
            }
        }
        CookieWriter::from_pairs(held)
    }

    fn session_with_token(token: &str, padding: usize) -> Session {
        let mut session = sample_session(padding);
        session.access_token = token.to_string();
        session
    }

    #[tokio::test]
    async fn new_chunked_session_supersedes_old_single_cookie() {
        let old = session_with_token("OLD", 0);
        let new = session_with_token("NEW", 7_000);
        let mut backend = MockIdentityBackend::new();
        backend
            .expect_exchange_code_for_session()
            .returning(move |_, _| Ok(Some(new.clone())));

        let request = vec![(
            "sb-auth-token".to_string(),
            old.to_cookie_value().unwrap(),
        )];
        let cookie = Cookie::new("sb-auth-token", request[0].1.clone())
            .encoded()
            .to_string();
        let response = get(
            state_with(backend),
            "/auth/callback?code=good-code",
            Some(&cookie),
        )
        .await;

        let browser = browser_cookies_after(&request, &response);
        assert!(browser.get("sb-auth-token").is_none());
        assert_eq!(browser.session("sb-auth-token").unwrap().access_token, "NEW");
    }

    #[tokio::test]
    async fn new_small_session_supersedes_old_chunks() {
        let old = session_with_token("OLD", 7_000).to_cookie_value().unwrap();
        let new = session_with_token("NEW", 0);
        let mut backend = MockIdentityBackend::new();
        backend
            .expect_exchange_code_for_session()
            .returning(move |_, _| Ok(Some(new.clone())));

        let request: Vec<(String, String)> =
            crate::auth::cookies::chunk_value("sb-auth-token", &old, 3180)
                .into_iter()
                .map(|chunk| (chunk.name, chunk.value))
                .collect();
        let cookie = request
            .iter()
            .map(|(name, value)| {
                Cookie::new(name.clone(), value.clone())
                    .encoded()
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join("; ");
        let response = get(
            state_with(backend),
            "/auth/callback?code=good-code",
            Some(&cookie),
        )
        .await;

        let browser = browser_cookies_after(&request, &response);
        assert!(browser.get("sb-auth-token.0").is_none());
        assert_eq!(browser.session("sb-auth-token").unwrap().access_token, "NEW");
    }

    #[tokio::test]
    async fn backend_cookies_are_kept_alongside_session_cookies() {
        let session = sample_session(0);
        let mut backend = MockIdentityBackend::new();
        backend
            .expect_exchange_code_for_session()
            .returning(move |_, cookies| {
                cookies.remove("sb-auth-token-code-verifier");
                Ok(Some(session.clone()))
            });

        let response = get(
            state_with(backend),
            "/auth/callback?code=good-code",
            Some("sb-auth-token-code-verifier=verifier"),
        )
        .await;

        let names: Vec<String> = set_cookies(&response)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert!(names.contains(&"sb-auth-token-code-verifier".to_string()));
        assert!(names.contains(&"sb-auth-token".to_string()));
    }

    #[tokio::test]
    async fn offsite_next_lands_on_root() {
        let session = sample_session(0);
        let mut backend = MockIdentityBackend::new();
        backend
            .expect_exchange_code_for_session()
            .returning(move |_, _| Ok(Some(session.clone())));

        let response = get(
            state_with(backend),
            "/auth/callback?code=good-code&next=https%3A%2F%2Fevil.example",
            None,
        )
        .await;

        assert_eq!(location(&response), "http://localhost:3000/");
    }

    #[tokio::test]
    async fn sign_in_redirects_to_authorization_url() {
        let mut backend = MockIdentityBackend::new();
        backend
            .expect_authorize_url()
            .withf(|provider, redirect_to, _| {
                provider == "google" && redirect_to == "http://localhost:3000/auth/callback"
            })
            .times(1)
            .returning(|_, _, _| Ok(Some("https://idp.example/authorize?x=1".to_string())));

        let response = get(state_with(backend), "/auth/signin", None).await;

        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "https://idp.example/authorize?x=1");
    }

    #[tokio::test]
    async fn sign_in_without_url_redirects_to_error_page() {
        let mut backend = MockIdentityBackend::new();
        backend.expect_authorize_url().returning(|_, _, _| Ok(None));

        let response = get(state_with(backend), "/auth/signin", None).await;

        assert_eq!(location(&response), "http://localhost:3000/auth/auth-code-error");
    }

    #[tokio::test]
    async fn current_user_without_session_is_unauthorized() {
        let mut backend = MockIdentityBackend::new();
        backend.expect_get_user().returning(|_| Ok(None));

        let response = get(state_with(backend), "/auth/user", None).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
