use axum::{response::IntoResponse, Json};
use utoipa::openapi::{InfoBuilder, License};
use utoipa::OpenApi;

use super::handlers::{
    admin, health, user, well_known, ApiResponse, ReturnMessage, UserProfile,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        well_known::openid_configuration,
        well_known::jwks,
        user::register,
        user::login,
        user::info,
        user::logout,
        user::delete,
        user::reactivate,
        admin::user,
    ),
    components(schemas(ApiResponse, ReturnMessage, UserProfile)),
    tags(
        (name = "health", description = "Liveness"),
        (name = "well-known", description = "OpenID discovery and signing keys"),
        (name = "user", description = "Registration, sessions and account lifecycle"),
        (name = "admin", description = "Admin-only identity lookups")
    )
)]
struct ApiDoc;

/// The generated `OpenAPI` document, with info taken from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    let mut license = License::new(env!("CARGO_PKG_LICENSE"));
    license.identifier = Some(env!("CARGO_PKG_LICENSE").to_string());
    info.license = Some(license);
    doc.info = info;

    doc
}

pub async fn openapi_json() -> impl IntoResponse {
    Json(openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for expected in [
            "/health",
            "/.well-known/openid-configuration",
            "/.well-known/jwks.json",
            "/api/v1/user/register",
            "/api/v1/user/login",
            "/api/v1/user/info",
            "/api/v1/user/logout",
            "/api/v1/user/delete",
            "/api/v1/user/reactivate",
            "/api/v1/admin/user/{id}",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
    }
}
