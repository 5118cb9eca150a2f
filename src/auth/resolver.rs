//! Resolve the caller behind a request.
//!
//! Flow Overview: read the `token` cookie, verify it for the user audience,
//! load the identity by the claimed id, then apply status policy. Missing,
//! invalid and expired tokens all resolve to "no caller".

use axum::{
    http::{header::COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::identity::{Identity, IdentityStore, Status};

use super::token::{TokenService, USER_AUDIENCE};

pub const SESSION_COOKIE_NAME: &str = "token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("forbidden")]
    Forbidden,
    #[error("identity store failure: {0}")]
    Store(anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Forbidden => "Forbidden",
            Self::Store(err) => {
                error!("Failed to resolve identity: {err:#}");
                "Internal Server Error"
            }
        };
        (self.status(), Json(json!({ "message": message }))).into_response()
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    tokens: Arc<TokenService>,
    store: Arc<dyn IdentityStore>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(tokens: Arc<TokenService>, store: Arc<dyn IdentityStore>) -> Self {
        Self { tokens, store }
    }

    /// Current caller, or `None` when unauthenticated.
    ///
    /// With `ignore_status` the identity is returned whatever its status, which
    /// lets deleted and banned accounts reach reactivation.
    ///
    /// # Errors
    /// `AuthError::Forbidden` for banned callers, `AuthError::Store` when the
    /// lookup itself fails.
    pub async fn resolve(
        &self,
        headers: &HeaderMap,
        ignore_status: bool,
    ) -> Result<Option<Identity>, AuthError> {
        let token = extract_session_token(headers);
        let Some(claims) = self.tokens.verify(token.as_deref(), USER_AUDIENCE) else {
            return Ok(None);
        };

        let Some(identity) = self
            .store
            .find_by_id(claims.id)
            .await
            .map_err(AuthError::Store)?
        else {
            debug!(id = claims.id, "token refers to an unknown identity");
            return Ok(None);
        };

        if ignore_status {
            return Ok(Some(identity));
        }

        match identity.status {
            Status::Normal => Ok(Some(identity)),
            Status::Deleted => Ok(None),
            Status::Banned => Err(AuthError::Forbidden),
        }
    }
}

/// Value of the session cookie, if the request carries one.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    // Browsers may send several Cookie headers over HTTP/2.
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME {
                let val = val.trim();
                return (!val.is_empty()).then(|| val.to_string());
            }
        }
    }
    None
}
