//! Event ingestion and retrieval.
//!
//! Payloads are stored as sent; they are encrypted on the client.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Query,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{accounts::SinceQuery, require};
use crate::{
    api::{config::AppState, error::ApiError, gates::UserIdentity},
    persistence::Event,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct EventRequest {
    account_id: String,
    payload: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventCreated {
    pub event_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventList {
    pub events: Vec<Event>,
}

#[utoipa::path(
    get,
    path = "/events",
    params(SinceQuery),
    responses(
        (status = 200, description = "Events of the user", body = EventList),
        (status = 204, description = "Client opted out"),
        (status = 401, description = "No identity cookie", body = crate::api::error::ErrorBody)
    ),
    tag = "events"
)]
pub async fn get_events(
    Extension(state): Extension<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
    query: Result<Query<SinceQuery>, QueryRejection>,
) -> Result<Json<EventList>, ApiError> {
    let Query(query) = query?;
    let events = state
        .db
        .query_events(&user_id, query.since.as_deref())
        .await?;
    Ok(Json(EventList { events }))
}

#[utoipa::path(
    post,
    path = "/events",
    request_body = EventRequest,
    responses(
        (status = 201, description = "Event stored, identity cookie refreshed", body = EventCreated),
        (status = 204, description = "Client opted out, nothing stored"),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody),
        (status = 401, description = "No identity cookie", body = crate::api::error::ErrorBody)
    ),
    tag = "events"
)]
pub async fn post_event(
    Extension(state): Extension<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
    payload: Result<Json<EventRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = insert(&state, Some(&user_id), payload).await?;
    let cookie = state.cookies.identity_cookie(&user_id, Utc::now())?;
    Ok((StatusCode::CREATED, cookie, Json(EventCreated { event_id })))
}

#[utoipa::path(
    post,
    path = "/events/anonymous",
    request_body = EventRequest,
    responses(
        (status = 201, description = "Anonymous event stored", body = EventCreated),
        (status = 204, description = "Client opted out, nothing stored"),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody)
    ),
    tag = "events"
)]
pub async fn post_anonymous_event(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<EventRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = insert(&state, None, payload).await?;
    Ok((StatusCode::CREATED, Json(EventCreated { event_id })))
}

async fn insert(
    state: &AppState,
    user_id: Option<&str>,
    payload: Result<Json<EventRequest>, JsonRejection>,
) -> Result<String, ApiError> {
    let Json(request) = payload?;
    let account_id = require(&request.account_id, "account_id")?;
    let payload = require(&request.payload, "payload")?;
    Ok(state.db.insert_event(account_id, user_id, payload).await?)
}
