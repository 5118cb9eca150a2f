pub mod admin;
pub mod health;
pub mod user;
pub mod well_known;

// common types and functions for the handlers
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::identity::{Identity, Role, Status};

/// Outcome label carried by every JSON response.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnMessage {
    Success,
    Error,
    Unauthorized,
    Forbidden,
    #[serde(rename = "Not Found")]
    NotFound,
    Conflict,
    #[serde(rename = "Unprocessable Entity")]
    UnprocessableEntity,
    #[serde(rename = "Internal Server Error")]
    InternalServerError,
}

impl ReturnMessage {
    #[must_use]
    pub fn for_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            StatusCode::FORBIDDEN => Self::Forbidden,
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::CONFLICT => Self::Conflict,
            StatusCode::UNPROCESSABLE_ENTITY => Self::UnprocessableEntity,
            StatusCode::INTERNAL_SERVER_ERROR => Self::InternalServerError,
            status if status.is_success() => Self::Success,
            _ => Self::Error,
        }
    }
}

/// Response envelope: `{"message": .., "data": ..}`.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApiResponse {
    pub message: ReturnMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Envelope without payload, message derived from the status.
pub fn reply(status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse {
            message: ReturnMessage::for_status(status),
            data: None,
        }),
    )
        .into_response()
}

/// Envelope with a payload. Serialization failures become a 500.
pub fn reply_with<T: Serialize>(status: StatusCode, data: &T) -> Response {
    match serde_json::to_value(data) {
        Ok(value) => (
            status,
            Json(ApiResponse {
                message: ReturnMessage::for_status(status),
                data: Some(value),
            }),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Failed to serialize response: {err}");
            reply(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Public view of an identity. Never includes the hash or second factor secrets.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: String,
    pub role: Role,
    pub status: Status,
    pub two_factor_enabled: bool,
}

impl From<&Identity> for UserProfile {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            avatar: identity.avatar.clone(),
            role: identity.role,
            status: identity.status,
            two_factor_enabled: identity.two_factor.enabled,
        }
    }
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[must_use]
pub fn valid_username(username: &str) -> bool {
    // 3 to 32 characters, letters, digits, `_`, `-` and `.`
    Regex::new(r"^[A-Za-z0-9_.\-]{3,32}$").is_ok_and(|re| re.is_match(username))
}

#[must_use]
pub fn valid_password(password: &str) -> bool {
    (8..=128).contains(&password.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_with_spaces() {
        let json = serde_json::to_string(&ReturnMessage::NotFound).unwrap_or_default();
        assert_eq!(json, "\"Not Found\"");
        let json = serde_json::to_string(&ReturnMessage::UnprocessableEntity).unwrap_or_default();
        assert_eq!(json, "\"Unprocessable Entity\"");
    }

    #[test]
    fn status_maps_to_message() {
        assert_eq!(ReturnMessage::for_status(StatusCode::CREATED), ReturnMessage::Success);
        assert_eq!(ReturnMessage::for_status(StatusCode::ACCEPTED), ReturnMessage::Success);
        assert_eq!(ReturnMessage::for_status(StatusCode::FORBIDDEN), ReturnMessage::Forbidden);
        assert_eq!(ReturnMessage::for_status(StatusCode::BAD_REQUEST), ReturnMessage::Error);
    }

    #[test]
    fn email_validation() {
        assert!(valid_email("alice@example.com"));
        assert!(!valid_email("alice@example"));
        assert!(!valid_email("alice example.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn username_validation() {
        assert!(valid_username("alice_01"));
        assert!(!valid_username("al"));
        assert!(!valid_username("alice smith"));
        assert!(!valid_username(&"a".repeat(33)));
    }

    #[test]
    fn password_length_bounds() {
        assert!(valid_password("12345678"));
        assert!(!valid_password("1234567"));
        assert!(!valid_password(&"x".repeat(129)));
    }
}
