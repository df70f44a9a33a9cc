//! Key exchange between a client and an account.
//!
//! The client fetches the account's public key, encrypts its own secret with
//! it and posts the result back. Posting is what first issues the identity
//! cookie; an existing identity is reused.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Query,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::require;
use crate::api::{
    config::AppState,
    cookies::{read_cookie, IDENTITY_COOKIE},
    error::ApiError,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PublicKeyQuery {
    account_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicKeyResponse {
    public_key: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserSecretRequest {
    account_id: String,
    encrypted_user_secret: String,
}

#[utoipa::path(
    get,
    path = "/exchange",
    params(PublicKeyQuery),
    responses(
        (status = 200, description = "Public key of the account", body = PublicKeyResponse),
        (status = 400, description = "Missing account id", body = crate::api::error::ErrorBody),
        (status = 404, description = "Unknown account", body = crate::api::error::ErrorBody)
    ),
    tag = "exchange"
)]
pub async fn get_public_key(
    Extension(state): Extension<Arc<AppState>>,
    query: Result<Query<PublicKeyQuery>, QueryRejection>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let Query(query) = query?;
    let account_id = require(&query.account_id, "account_id")?;
    let public_key = state.db.get_public_key(account_id).await?;
    Ok(Json(PublicKeyResponse { public_key }))
}

#[utoipa::path(
    post,
    path = "/exchange",
    request_body = UserSecretRequest,
    responses(
        (status = 204, description = "Secret stored, identity cookie issued"),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody),
        (status = 404, description = "Unknown account", body = crate::api::error::ErrorBody)
    ),
    tag = "exchange"
)]
#[instrument(skip_all)]
pub async fn post_user_secret(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<UserSecretRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let account_id = require(&request.account_id, "account_id")?;
    let secret = require(&request.encrypted_user_secret, "encrypted_user_secret")?;

    let user_id = match read_cookie(&headers, IDENTITY_COOKIE).filter(|id| !id.is_empty()) {
        Some(user_id) => user_id,
        None => {
            debug!("no identity cookie, creating a new identity");
            Uuid::new_v4().to_string()
        }
    };

    state
        .db
        .associate_user_secret(account_id, &user_id, secret)
        .await?;

    let cookie = state.cookies.identity_cookie(&user_id, Utc::now())?;
    Ok((StatusCode::NO_CONTENT, cookie, ()))
}
