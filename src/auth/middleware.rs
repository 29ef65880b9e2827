//! Session extractors
//!
//! Protect pages that require a signed-in user. The user is resolved by
//! the identity backend from the request cookies and cached in the request
//! extensions, so several extractors on one request cost one lookup.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::Redirect,
};
use axum_extra::extract::CookieJar;

use super::cookies::CookieWriter;
use super::session::User;
use crate::AppState;
use crate::metrics::SESSION_LOOKUPS_TOTAL;

async fn resolve_user(parts: &mut Parts, state: &AppState) -> Option<User> {
    if let Some(user) = parts.extensions.get::<User>().cloned() {
        return Some(user);
    }

    let jar = CookieJar::from_headers(&parts.headers);
    let cookies = CookieWriter::from_jar(&jar);

    let user = match state.backend.get_user(&cookies).await {
        Ok(Some(user)) => {
            SESSION_LOOKUPS_TOTAL.with_label_values(&["user"]).inc();
            Some(user)
        }
        Ok(None) => {
            SESSION_LOOKUPS_TOTAL.with_label_values(&["anonymous"]).inc();
            None
        }
        Err(error) => {
            SESSION_LOOKUPS_TOTAL.with_label_values(&["error"]).inc();
            tracing::warn!(%error, "Session lookup failed; treating request as anonymous");
            None
        }
    };

    if let Some(user) = &user {
        parts.extensions.insert(user.clone());
    }

    user
}

/// Extractor for the signed-in user
///
/// Visitors without a session are redirected to the home page.
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", user.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        match resolve_user(parts, &state).await {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(Redirect::to(&state.config.auth.home_path)),
        }
    }
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of redirecting.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(MaybeUser(resolve_user(parts, &state).await))
    }
}
