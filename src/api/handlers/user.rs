//! Account endpoints under `/api/v1/user`.
//!
//! Flow Overview:
//! 1) `register` stores a new `user` with an argon2 hash.
//! 2) `login` verifies the password and sets the `token` session cookie.
//! 3) `info`, `delete` and `reactivate` resolve the caller from that cookie.
//!
//! Deletion is two-phase: a request without a nonce returns one (202) and acts
//! on nothing; resubmitting with that nonce marks the account deleted (200).

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

use super::{
    reply, reply_with, valid_email, valid_password, valid_username, ApiResponse, UserProfile,
};
use crate::{
    api::state::{AppState, AuthConfig, DeletionContext},
    auth::{
        password::{hash_password, verify_password},
        SessionClaims, SESSION_COOKIE_NAME, USER_AUDIENCE,
    },
    identity::{is_duplicate, Identity, Status},
};

#[derive(ToSchema, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct DeleteRequest {
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub id: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct NonceResponse {
    pub nonce: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/user/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse),
        (status = 409, description = "Username or email already registered", body = ApiResponse),
        (status = 422, description = "Invalid username, email or password", body = ApiResponse)
    ),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn register(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return reply(StatusCode::BAD_REQUEST);
    };

    let username = request.username.trim().to_string();
    let email = request.email.trim().to_lowercase();
    if !valid_username(&username) || !valid_email(&email) || !valid_password(&request.password) {
        return reply(StatusCode::UNPROCESSABLE_ENTITY);
    }

    match state
        .store()
        .exists_by_username_or_email(&username, &email)
        .await
    {
        Ok(false) => {}
        Ok(true) => {
            debug!("Registration rejected, username or email taken");
            return reply(StatusCode::CONFLICT);
        }
        Err(err) => {
            error!("Failed to check existing identities: {err:#}");
            return reply(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let password = request.password;
    let pwd_hash = match tokio::task::spawn_blocking(move || hash_password(&password)).await {
        Ok(Ok(hash)) => hash,
        Ok(Err(err)) => {
            error!("Failed to hash password: {err:#}");
            return reply(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Err(err) => {
            error!("Password hashing task failed: {err}");
            return reply(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    match state
        .store()
        .save(&Identity::new(username, email, pwd_hash))
        .await
    {
        Ok(identity) => {
            info!(id = identity.id, "Registered identity");
            reply_with(StatusCode::CREATED, &RegisterResponse { id: identity.id })
        }
        // Lost a race with a concurrent registration for the same name or email.
        Err(err) if is_duplicate(&err) => {
            debug!("Registration rejected on save, username or email taken");
            reply(StatusCode::CONFLICT)
        }
        Err(err) => {
            error!("Failed to save identity: {err:#}");
            reply(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session cookie set", body = ApiResponse),
        (status = 401, description = "Invalid credentials", body = ApiResponse),
        (status = 403, description = "Account is banned", body = ApiResponse)
    ),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn login(state: Extension<Arc<AppState>>, payload: Option<Json<LoginRequest>>) -> Response {
    let Some(Json(request)) = payload else {
        return reply(StatusCode::BAD_REQUEST);
    };

    let identity = match state.store().find_by_username(request.username.trim()).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return reply(StatusCode::UNAUTHORIZED),
        Err(err) => {
            error!("Failed to look up identity: {err:#}");
            return reply(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let password = request.password;
    let pwd_hash = identity.pwd_hash.clone();
    match tokio::task::spawn_blocking(move || verify_password(&password, &pwd_hash)).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(id = identity.id, "Password mismatch");
            return reply(StatusCode::UNAUTHORIZED);
        }
        Err(err) => {
            error!("Password verification task failed: {err}");
            return reply(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    // Deleted accounts still get a session so they can reactivate.
    if identity.status == Status::Banned {
        return reply(StatusCode::FORBIDDEN);
    }

    let token = match state.tokens().issue(
        &SessionClaims { id: identity.id },
        USER_AUDIENCE,
        state.config().session_ttl(),
    ) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue session token: {err}");
            return reply(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let cookie = match session_cookie(state.config(), &token) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return reply(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    info!(id = identity.id, "Session issued");
    let mut response = reply_with(StatusCode::OK, &UserProfile::from(&identity));
    response.headers_mut().insert(SET_COOKIE, cookie);
    response
}

#[utoipa::path(
    get,
    path = "/api/v1/user/info",
    responses(
        (status = 200, description = "Profile of the caller", body = ApiResponse),
        (status = 401, description = "No valid session", body = ApiResponse),
        (status = 403, description = "Account is banned", body = ApiResponse)
    ),
    tag = "user"
)]
pub async fn info(headers: HeaderMap, state: Extension<Arc<AppState>>) -> Response {
    match state.resolver().resolve(&headers, false).await {
        Ok(Some(identity)) => reply_with(StatusCode::OK, &UserProfile::from(&identity)),
        Ok(None) => reply(StatusCode::UNAUTHORIZED),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/user/logout",
    responses(
        (status = 204, description = "Session cookie cleared"),
        (status = 500, description = "Clearing cookie could not be built", body = ApiResponse)
    ),
    tag = "user"
)]
pub async fn logout(state: Extension<Arc<AppState>>) -> Response {
    // Tokens are stateless; clearing the cookie is all there is to do.
    match clear_session_cookie(state.config()) {
        Ok(cookie) => (StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response(),
        Err(err) => {
            error!("Failed to build clearing session cookie: {err}");
            reply(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/user/delete",
    request_body(content = DeleteRequest, description = "Omit `nonce` to request one"),
    responses(
        (status = 200, description = "Account marked deleted", body = ApiResponse),
        (status = 202, description = "Confirmation nonce issued, nothing deleted", body = ApiResponse),
        (status = 401, description = "No valid session", body = ApiResponse),
        (status = 403, description = "Account is banned", body = ApiResponse)
    ),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn delete(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<DeleteRequest>>,
) -> Response {
    let mut identity = match state.resolver().resolve(&headers, false).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return reply(StatusCode::UNAUTHORIZED),
        Err(err) => return err.into_response(),
    };
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let nonces = state.deletion_nonces();

    if let Some(nonce) = request.nonce.as_deref() {
        match nonces.verify(nonce).await {
            Some(DeletionContext { user_id }) if user_id == identity.id => {
                identity.status = Status::Deleted;
                if let Err(err) = state.store().save(&identity).await {
                    error!("Failed to mark identity deleted: {err:#}");
                    return reply(StatusCode::INTERNAL_SERVER_ERROR);
                }
                nonces.delete(nonce).await;
                info!(id = identity.id, "Identity deleted");

                let mut response = reply(StatusCode::OK);
                match clear_session_cookie(state.config()) {
                    Ok(cookie) => {
                        response.headers_mut().insert(SET_COOKIE, cookie);
                    }
                    // The account is already deleted; the stale cookie resolves to nobody.
                    Err(err) => error!("Failed to build clearing session cookie: {err}"),
                }
                return response;
            }
            Some(_) => debug!(id = identity.id, "Deletion nonce bound to another identity"),
            None => debug!(id = identity.id, "Deletion nonce unknown or expired"),
        }
    }

    let caller = identity.id;
    let nonce = match nonces.find(|context| context.user_id == caller).await {
        Some(nonce) => nonce,
        None => {
            nonces
                .generate(DeletionContext { user_id: caller }, None)
                .await
        }
    };
    reply_with(StatusCode::ACCEPTED, &NonceResponse { nonce })
}

#[utoipa::path(
    post,
    path = "/api/v1/user/reactivate",
    responses(
        (status = 200, description = "Account is active", body = ApiResponse),
        (status = 401, description = "No valid session", body = ApiResponse),
        (status = 403, description = "Account is banned", body = ApiResponse)
    ),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn reactivate(headers: HeaderMap, state: Extension<Arc<AppState>>) -> Response {
    let mut identity = match state.resolver().resolve(&headers, true).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return reply(StatusCode::UNAUTHORIZED),
        Err(err) => return err.into_response(),
    };

    match identity.status {
        Status::Banned => return reply(StatusCode::FORBIDDEN),
        Status::Normal => {}
        Status::Deleted => {
            identity.status = Status::Normal;
            let saved = state.store().save(&identity).await;
            identity = match saved {
                Ok(identity) => identity,
                Err(err) => {
                    error!("Failed to reactivate identity: {err:#}");
                    return reply(StatusCode::INTERNAL_SERVER_ERROR);
                }
            };
            info!(id = identity.id, "Identity reactivated");
        }
    }

    reply_with(StatusCode::OK, &UserProfile::from(&identity))
}

/// `HttpOnly` session cookie carrying `token`.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_carries_ttl() {
        let config = AuthConfig::default().with_session_ttl_seconds(120);
        let cookie = session_cookie(&config, "a.b.c").map(|value| value.to_str().map(str::to_string));
        assert_eq!(
            cookie.ok().and_then(Result::ok).as_deref(),
            Some("token=a.b.c; Path=/; HttpOnly; SameSite=Lax; Max-Age=120")
        );
    }

    #[test]
    fn cookies_are_secure_over_https() {
        let config = AuthConfig::new("https://id.example.com".to_string());
        let set = session_cookie(&config, "a.b.c").ok();
        let cleared = clear_session_cookie(&config).ok();

        for value in [set, cleared] {
            let value = value.and_then(|value| value.to_str().ok().map(str::to_string));
            assert!(value.is_some_and(|value| value.ends_with("; Secure")));
        }
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let value = clear_session_cookie(&AuthConfig::default()).ok();
        let value = value.and_then(|value| value.to_str().ok().map(str::to_string));
        assert!(value.is_some_and(|value| value.contains("Max-Age=0") && value.starts_with("token=;")));
    }
}
