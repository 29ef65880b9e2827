//! OAuth sign-in and session cookies
//!
//! Handles:
//! - Sign-in redirect to the identity provider
//! - OAuth callback and chunked session cookies
//! - Sign-out
//! - Session extractors for protected pages

pub mod cookies;
mod middleware;
mod oauth;
pub mod session;

pub use cookies::CookieWriter;
pub use middleware::{CurrentUser, MaybeUser};
pub use oauth::{auth_router, sanitize_next};
pub use session::{Session, User};
