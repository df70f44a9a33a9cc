//! Account login and credential management.
//!
//! A successful login issues the signed `auth` cookie. Changing the password
//! or the email address ends the session, so the user has to log in again
//! with the new credentials.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use url::Url;
use utoipa::ToSchema;

use super::{normalize_email, require, valid_email};
use crate::{
    api::{
        config::AppState,
        cookies::Cookie,
        error::{ApiError, EncodingError, GateFailure},
        gates::AccountSession,
    },
    mailer::{deliver, Message},
    persistence::{AccountUser, PersistenceError},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    current_password: String,
    changed_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeEmailRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    username: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    username: String,
    password: String,
    token: String,
}

#[utoipa::path(
    get,
    path = "/login",
    responses(
        (status = 200, description = "Currently logged in account user", body = AccountUser),
        (status = 401, description = "No valid session", body = crate::api::error::ErrorBody)
    ),
    tag = "login"
)]
pub async fn get_login(
    Extension(state): Extension<Arc<AppState>>,
    AccountSession(account_user_id): AccountSession,
) -> Result<Json<AccountUser>, ApiError> {
    // A valid token for a user that no longer exists is not a session.
    match state.db.lookup_account_user(&account_user_id).await {
        Ok(user) => Ok(Json(user)),
        Err(PersistenceError::NotFound) => Err(GateFailure::Unauthenticated.into()),
        Err(err) => Err(err.into()),
    }
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, session cookie issued", body = AccountUser),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody),
        (status = 401, description = "Invalid credentials", body = crate::api::error::ErrorBody)
    ),
    tag = "login"
)]
#[instrument(skip_all)]
pub async fn post_login(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let email = normalize_email(require(&request.username, "username")?);
    let password = require(&request.password, "password")?;

    let user = state.db.login(&email, password).await?;
    let cookie = state
        .cookies
        .session_cookie(&user.account_user_id, Utc::now())?;

    info!(account_user_id = %user.account_user_id, "account user logged in");
    Ok((StatusCode::OK, cookie, Json(user)))
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 204, description = "Session cookie cleared")
    ),
    tag = "login"
)]
pub async fn post_logout(Extension(state): Extension<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok((StatusCode::NO_CONTENT, logout_cookie(&state)?, ()))
}

#[utoipa::path(
    post,
    path = "/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed, session ended"),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody),
        (status = 401, description = "No valid session or wrong password", body = crate::api::error::ErrorBody)
    ),
    tag = "login"
)]
#[instrument(skip_all)]
pub async fn post_change_password(
    Extension(state): Extension<Arc<AppState>>,
    AccountSession(account_user_id): AccountSession,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let current = require(&request.current_password, "current_password")?;
    let changed = require(&request.changed_password, "changed_password")?;

    state
        .db
        .change_password(&account_user_id, current, changed)
        .await?;

    info!(%account_user_id, "password changed");
    Ok((StatusCode::NO_CONTENT, logout_cookie(&state)?, ()))
}

#[utoipa::path(
    post,
    path = "/change-email",
    request_body = ChangeEmailRequest,
    responses(
        (status = 204, description = "Email changed, session ended"),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody),
        (status = 401, description = "No valid session or wrong password", body = crate::api::error::ErrorBody),
        (status = 409, description = "Email address already in use", body = crate::api::error::ErrorBody)
    ),
    tag = "login"
)]
#[instrument(skip_all)]
pub async fn post_change_email(
    Extension(state): Extension<Arc<AppState>>,
    AccountSession(account_user_id): AccountSession,
    payload: Result<Json<ChangeEmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let email = normalize_email(require(&request.email, "email")?);
    if !valid_email(&email) {
        return Err(ApiError::BadRequest("email is invalid".to_string()));
    }
    let password = require(&request.password, "password")?;

    state
        .db
        .change_email(&account_user_id, &email, password)
        .await?;

    let message = Message {
        to: email,
        subject: "Your email address has been changed".to_string(),
        body: format!(
            "The email address of your account was changed. You can log in at {}.",
            state.frontend_base_url
        ),
    };
    if let Err(err) = deliver(state.mailer.clone(), message).await {
        error!("Failed to send email change confirmation: {err:#}");
    }

    info!(%account_user_id, "email changed");
    Ok((StatusCode::NO_CONTENT, logout_cookie(&state)?, ()))
}

#[utoipa::path(
    post,
    path = "/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 204, description = "Reset link mailed if the account exists"),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody)
    ),
    tag = "login"
)]
#[instrument(skip_all)]
pub async fn post_forgot_password(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload?;
    let email = normalize_email(require(&request.username, "username")?);

    // Unknown addresses get the same answer as known ones.
    let key = match state.db.generate_one_time_key(&email).await {
        Ok(key) => key,
        Err(PersistenceError::NotFound) => {
            debug!("password reset requested for unknown address");
            return Ok(StatusCode::NO_CONTENT);
        }
        Err(err) => return Err(err.into()),
    };

    let link = reset_link(&state.frontend_base_url, &key).map_err(ApiError::Collaborator)?;
    let message = Message {
        to: email,
        subject: "Reset your password".to_string(),
        body: format!("Follow this link to choose a new password: {link}"),
    };
    if let Err(err) = deliver(state.mailer.clone(), message).await {
        error!("Failed to send password reset mail: {err:#}");
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password reset"),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody),
        (status = 401, description = "Invalid or expired key", body = crate::api::error::ErrorBody)
    ),
    tag = "login"
)]
#[instrument(skip_all)]
pub async fn post_reset_password(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload?;
    let email = normalize_email(require(&request.username, "username")?);
    let password = require(&request.password, "password")?;
    let token = require(&request.token, "token")?;

    state.db.reset_password(&email, password, token).await?;

    info!("password reset");
    Ok(StatusCode::NO_CONTENT)
}

fn logout_cookie(state: &AppState) -> Result<Cookie, EncodingError> {
    state.cookies.session_cookie("", Utc::now())
}

/// `<frontend>/reset-password/?token=<key>`, keeping any path prefix of the
/// frontend base URL.
fn reset_link(frontend_base_url: &str, key: &str) -> anyhow::Result<Url> {
    let base = Url::parse(&format!("{}/", frontend_base_url.trim_end_matches('/')))?;
    let mut link = base.join("reset-password/")?;
    link.query_pairs_mut().append_pair("token", key);
    Ok(link)
}
