//! Opt-out and opt-in.
//!
//! Both answer `GET` and `POST` so they work from a plain link as well as
//! from a script.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use std::sync::Arc;

use crate::api::config::AppState;

#[utoipa::path(
    method(get, post),
    path = "/opt-out",
    responses(
        (status = 204, description = "Opt-out cookie set")
    ),
    tag = "optout"
)]
pub async fn opt_out(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        state.cookies.optout_cookie(true, Utc::now()),
        (),
    )
}

#[utoipa::path(
    method(get, post),
    path = "/opt-in",
    responses(
        (status = 204, description = "Opt-out cookie cleared")
    ),
    tag = "optout"
)]
pub async fn opt_in(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        state.cookies.optout_cookie(false, Utc::now()),
        (),
    )
}
