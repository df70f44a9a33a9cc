//! Error taxonomy shared by gates and handlers.
//!
//! Every variant renders the same JSON body, `{"error": ..., "status": ...}`.
//! Collaborator failures are logged with their cause and answered with a
//! generic message.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header::InvalidHeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::persistence::PersistenceError;

/// Reasons a gate halts a request with an authorization error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum GateFailure {
    #[error("user identity cookie is missing")]
    MissingIdentity,
    #[error("not authenticated")]
    Unauthenticated,
}

/// Failures while producing an outbound cookie.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("cookie signing secret is not configured")]
    MissingSecret,
    #[error("cookie cannot be written as a header: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("cookie expiry is out of range")]
    ExpiryOutOfRange,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Gate(#[from] GateFailure),
    #[error("failed to encode cookie: {0}")]
    Encoding(#[from] EncodingError),
    #[error("not found")]
    NotFound,
    #[error("invalid credentials")]
    Credentials,
    #[error("email address is already in use")]
    Conflict,
    #[error("{0}")]
    BadRequest(String),
    #[error("collaborator failure: {0:#}")]
    Collaborator(anyhow::Error),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Gate(_) | Self::Credentials => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Encoding(_) | Self::Collaborator(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Encoding(_) | Self::Collaborator(_) => {
                error!(error = %self, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound => Self::NotFound,
            PersistenceError::Unauthorized => Self::Credentials,
            PersistenceError::Conflict => Self::Conflict,
            PersistenceError::Storage(source) => Self::Collaborator(source),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Uniform answer for unmatched paths and methods.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use axum::body::to_bytes;

    async fn body_json(err: ApiError) -> anyhow::Result<(StatusCode, serde_json::Value)> {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }

    #[tokio::test]
    async fn gate_failures_are_unauthorized() -> anyhow::Result<()> {
        let (status, body) = body_json(GateFailure::MissingIdentity.into()).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);
        assert_eq!(body["error"], "user identity cookie is missing");

        let (status, _) = body_json(GateFailure::Unauthenticated.into()).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn collaborator_detail_is_not_exposed() -> anyhow::Result<()> {
        let err = ApiError::Collaborator(anyhow!("connection refused to 10.0.0.3"));
        let (status, body) = body_json(err).await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
        Ok(())
    }

    #[test]
    fn persistence_errors_map_to_api_errors() {
        assert!(matches!(
            ApiError::from(PersistenceError::NotFound),
            ApiError::NotFound
        ));
        assert!(matches!(
            ApiError::from(PersistenceError::Unauthorized),
            ApiError::Credentials
        ));
        assert_eq!(
            ApiError::from(PersistenceError::Conflict).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(PersistenceError::Storage(anyhow!("boom"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn encoding_error_is_server_error() {
        let err = ApiError::from(EncodingError::MissingSecret);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
