//! HTML pages
//!
//! Home page with the sign-in button, the protected page, and the page
//! every failed sign-in lands on.

use axum::{
    Router,
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
};

use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser, User};
use crate::config::AuthConfig;

/// Create pages router
///
/// Routes:
/// - GET / - Home page
/// - GET /protected - Signed-in users only
/// - GET <error_path> - Authentication error page
pub fn pages_router(config: &AuthConfig) -> Router<AppState> {
    Router::new()
        .route("/", get(home_page))
        .route("/protected", get(protected_page))
        .route(&config.error_path, get(auth_error_page))
}

/// GET /
async fn home_page(MaybeUser(user): MaybeUser) -> impl IntoResponse {
    let body = match &user {
        Some(user) => format!(
            r#"<p>You are signed in.</p>
  <p><a href="/protected">Go to protected page</a></p>
  {}"#,
            render_auth_button(user)
        ),
        None => r#"<form method="post" action="/auth/signin">
    <button type="submit">Sign in with Google</button>
  </form>"#
            .to_string(),
    };

    Html(render_layout("authbridge", &body))
}

/// GET /protected
///
/// Renders the signed-in user's profile. Anonymous visitors are sent home
/// by the [`CurrentUser`] extractor.
async fn protected_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
    let profile = serde_json::to_string_pretty(&user).unwrap_or_default();

    let body = format!(
        r#"<nav>
    <a href="{}">&larr; Back to Home</a>
    {}
  </nav>
  <h1>Protected Page</h1>
  <p>This page is only accessible to authenticated users</p>
  <h3>User Details</h3>
  <pre>{}</pre>"#,
        html_escape::encode_double_quoted_attribute(&state.config.auth.home_path),
        render_auth_button(&user),
        html_escape::encode_text(&profile)
    );

    Html(render_layout("Protected Page", &body))
}

/// GET <error_path>
async fn auth_error_page(State(state): State<AppState>) -> impl IntoResponse {
    let body = format!(
        r#"<h1>Authentication Error</h1>
  <p>There was a problem signing you in.</p>
  <a href="{}">Go Back Home</a>"#,
        html_escape::encode_double_quoted_attribute(&state.config.auth.home_path)
    );

    Html(render_layout("Authentication Error", &body))
}

/// Signed-in user's email with a sign-out button.
fn render_auth_button(user: &User) -> String {
    let label = user.email.as_deref().unwrap_or(&user.id);

    format!(
        r#"<div class="auth-button">
    <span>{}</span>
    <form method="post" action="/auth/signout">
      <button type="submit">Sign Out</button>
    </form>
  </div>"#,
        html_escape::encode_text(label)
    )
}

fn render_layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{}</title>
</head>
<body>
  {}
</body>
</html>"#,
        html_escape::encode_text(title),
        body
    )
}
