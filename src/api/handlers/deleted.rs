//! Deletion sync and purge.
//!
//! Clients send the ids of events they hold locally and get back the ones that
//! no longer exist. The bare `/deleted` endpoint takes the manifest on trust
//! and is not gated.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::api::{config::AppState, error::ApiError, gates::UserIdentity};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventIds {
    pub event_ids: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/deleted",
    request_body = EventIds,
    responses(
        (status = 200, description = "Ids that no longer exist", body = EventIds),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody)
    ),
    tag = "events"
)]
pub async fn get_deleted_events(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<EventIds>, JsonRejection>,
) -> Result<Json<EventIds>, ApiError> {
    deleted_events(&state, None, payload).await
}

#[utoipa::path(
    post,
    path = "/deleted/user",
    request_body = EventIds,
    responses(
        (status = 200, description = "Ids that no longer exist or belong to someone else", body = EventIds),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody),
        (status = 401, description = "No identity cookie", body = crate::api::error::ErrorBody)
    ),
    tag = "events"
)]
pub async fn get_deleted_user_events(
    Extension(state): Extension<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
    payload: Result<Json<EventIds>, JsonRejection>,
) -> Result<Json<EventIds>, ApiError> {
    deleted_events(&state, Some(&user_id), payload).await
}

async fn deleted_events(
    state: &AppState,
    user_id: Option<&str>,
    payload: Result<Json<EventIds>, JsonRejection>,
) -> Result<Json<EventIds>, ApiError> {
    let Json(request) = payload?;
    let event_ids = state
        .db
        .get_deleted_events(&request.event_ids, user_id)
        .await?;
    Ok(Json(EventIds { event_ids }))
}

#[utoipa::path(
    post,
    path = "/purge",
    responses(
        (status = 204, description = "All events of the user removed"),
        (status = 401, description = "No identity cookie", body = crate::api::error::ErrorBody)
    ),
    tag = "events"
)]
#[instrument(skip_all)]
pub async fn purge_events(
    Extension(state): Extension<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
) -> Result<StatusCode, ApiError> {
    state.db.purge_events(&user_id).await?;
    info!("purged events of user");
    Ok(StatusCode::NO_CONTENT)
}
