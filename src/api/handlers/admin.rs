use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{reply, reply_with, ApiResponse, UserProfile};
use crate::{api::state::AppState, auth::require_role, identity::Role};

#[utoipa::path(
    get,
    path = "/api/v1/admin/user/{id}",
    params(
        ("id" = i64, Path, description = "Identity id")
    ),
    responses(
        (status = 200, description = "Profile of the requested identity", body = ApiResponse),
        (status = 401, description = "No valid session", body = ApiResponse),
        (status = 403, description = "Caller is not an admin", body = ApiResponse),
        (status = 404, description = "No identity with that id", body = ApiResponse)
    ),
    tag = "admin"
)]
pub async fn user(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Response {
    let caller = match state.resolver().resolve(&headers, false).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return reply(StatusCode::UNAUTHORIZED),
        Err(err) => return err.into_response(),
    };

    if let Err(err) = require_role(&caller, Role::Admin) {
        debug!(id = caller.id, "Admin lookup denied");
        return err.into_response();
    }

    match state.store().find_by_id(id).await {
        Ok(Some(identity)) => reply_with(StatusCode::OK, &UserProfile::from(&identity)),
        Ok(None) => reply(StatusCode::NOT_FOUND),
        Err(err) => {
            error!("Failed to look up identity {id}: {err:#}");
            reply(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
