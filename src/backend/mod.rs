//! Identity backend
//!
//! Everything that actually authenticates someone happens behind this
//! trait: building the provider authorization URL, exchanging the code,
//! resolving the user from a session, and revoking it. The service only
//! moves cookies and redirects around these calls.

mod gotrue;
mod pkce;

pub use gotrue::GoTrueClient;
pub use pkce::{generate_code_challenge, generate_code_verifier};

use async_trait::async_trait;

use crate::auth::CookieWriter;
use crate::auth::session::{Session, User};
use crate::error::Result;

/// Delegated authentication operations
///
/// Implementations may read the request cookies and queue response
/// cookies through the [`CookieWriter`] they are handed. Those writes are
/// applied before anything the calling route writes afterwards.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityBackend: Send + Sync + 'static {
    /// Authorization URL for `provider` that returns to `redirect_to`
    ///
    /// `Ok(None)` means the backend had no URL to offer.
    async fn authorize_url(
        &self,
        provider: &str,
        redirect_to: &str,
        cookies: &mut CookieWriter,
    ) -> Result<Option<String>>;

    /// Exchange an authorization code for a session
    ///
    /// `Ok(None)` means the backend accepted the code but returned no session.
    async fn exchange_code_for_session(
        &self,
        code: &str,
        cookies: &mut CookieWriter,
    ) -> Result<Option<Session>>;

    /// Resolve the signed-in user from the request cookies
    async fn get_user(&self, cookies: &CookieWriter) -> Result<Option<User>>;

    /// Revoke the session behind `access_token`
    async fn sign_out(&self, access_token: &str) -> Result<()>;
}
