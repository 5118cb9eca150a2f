//! Session and authorization core.
//!
//! - [`token`]: RS256 session tokens and the JWKS view of the signing key.
//! - [`nonce`]: confirmation codes that gate irreversible actions.
//! - [`access`]: role checks.
//! - [`resolver`]: cookie to identity, with status policy.

pub mod access;
pub mod jwks;
pub mod keys;
pub mod nonce;
pub mod password;
pub mod resolver;
pub mod token;

pub use access::{has_permission, require_role};
pub use jwks::{Jwk, Jwks};
pub use nonce::NonceRegistry;
pub use resolver::{AuthError, IdentityResolver, SESSION_COOKIE_NAME};
pub use token::{KeyPair, SessionClaims, TokenError, TokenService, ISSUER, USER_AUDIENCE};
