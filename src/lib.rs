//! # Asashio
//!
//! An identity backend built around stateless sessions.
//!
//! ## Sessions
//!
//! A successful login sets a `token` cookie holding an RS256-signed token that
//! asserts the account id. Nothing about the session is stored server side:
//! every request re-verifies the signature, issuer, audience and expiry, then
//! loads the account to apply its status (`deleted` accounts read as signed
//! out, `banned` accounts are refused with 403).
//!
//! The signing key pair is generated on first boot and persisted in the
//! settings store, so sessions survive restarts. The public half is published
//! at `/.well-known/jwks.json`.
//!
//! ## Confirmations
//!
//! Irreversible actions such as account deletion are two-phase. The first
//! request returns a short-lived nonce bound to the caller; only a second
//! request carrying that nonce performs the action.
//!
//! ## Roles
//!
//! Roles are ordered `guest < user < admin`; privileged routes require a
//! minimum role.

pub mod api;
pub mod auth;
pub mod cli;
pub mod identity;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
