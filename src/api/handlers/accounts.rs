use axum::{
    extract::{rejection::QueryRejection, Extension, Path, Query},
    response::Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::IntoParams;

use crate::{
    api::{config::AppState, error::ApiError, gates::AccountSession},
    persistence::Account,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SinceQuery {
    /// Only return events newer than this event id.
    pub since: Option<String>,
}

#[utoipa::path(
    get,
    path = "/accounts/{account_id}",
    params(
        ("account_id" = String, Path, description = "Account id"),
        SinceQuery
    ),
    responses(
        (status = 200, description = "Account and its events", body = Account),
        (status = 401, description = "No valid session", body = crate::api::error::ErrorBody),
        (status = 404, description = "Unknown account or no access", body = crate::api::error::ErrorBody)
    ),
    tag = "accounts"
)]
pub async fn get_account(
    Extension(state): Extension<Arc<AppState>>,
    AccountSession(account_user_id): AccountSession,
    Path(account_id): Path<String>,
    query: Result<Query<SinceQuery>, QueryRejection>,
) -> Result<Json<Account>, ApiError> {
    let Query(query) = query?;
    let user = state.db.lookup_account_user(&account_user_id).await?;

    // Non-members get the same answer as for an unknown account.
    if !user.account_ids.contains(&account_id) {
        debug!(%account_user_id, %account_id, "account access denied");
        return Err(ApiError::NotFound);
    }

    let account = state
        .db
        .get_account(&account_id, query.since.as_deref())
        .await?;
    Ok(Json(account))
}
