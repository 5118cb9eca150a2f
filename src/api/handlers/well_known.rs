//! Discovery documents under `/.well-known`.

use axum::{extract::Extension, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::state::AppState;

/// OpenID Provider metadata.
///
/// `authorization_endpoint` and `token_endpoint` are mandatory discovery
/// fields and are advertised at their conventional paths, but the OAuth flow
/// is not served: both answer 404. Only userinfo and JWKS are live.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OidcOptions {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl OidcOptions {
    #[must_use]
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            issuer: base_url.to_string(),
            authorization_endpoint: format!("{base_url}/oauth/authorize"),
            token_endpoint: format!("{base_url}/api/v1/oauth/token"),
            userinfo_endpoint: format!("{base_url}/api/v1/user/info"),
            jwks_uri: format!("{base_url}/.well-known/jwks.json"),
            scopes_supported: strings(&["openid", "profile", "email"]),
            response_types_supported: strings(&["code"]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: strings(&["RS256"]),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    responses(
        (status = 200, description = "OpenID discovery document", body = OidcOptions)
    ),
    tag = "well-known"
)]
pub async fn openid_configuration(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(OidcOptions::for_base_url(state.config().base_url()))
}

#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses(
        (status = 200, description = "Public signing keys", content_type = "application/json")
    ),
    tag = "well-known"
)]
pub async fn jwks(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.tokens().jwks())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_is_rooted_at_base_url() {
        let options = OidcOptions::for_base_url("https://id.example.com");
        assert_eq!(options.issuer, "https://id.example.com");
        assert_eq!(
            options.jwks_uri,
            "https://id.example.com/.well-known/jwks.json"
        );
        assert_eq!(
            options.userinfo_endpoint,
            "https://id.example.com/api/v1/user/info"
        );
        assert_eq!(options.id_token_signing_alg_values_supported, ["RS256"]);
    }

    #[test]
    fn unsupported_features_are_not_advertised() {
        let value = serde_json::to_value(OidcOptions::for_base_url("http://localhost:8080"))
            .unwrap_or_default();
        for field in [
            "registration_endpoint",
            "response_modes_supported",
            "grant_types_supported",
        ] {
            assert!(value.get(field).is_none(), "{field} should be absent");
        }
        assert_eq!(value["scopes_supported"][0], "openid");
        assert_eq!(value["response_types_supported"][0], "code");
    }
}
