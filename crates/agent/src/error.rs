//! Unified error handling for the agent's HTTP surface.
//!
//! Handlers return `ApiResult<T>` and use `?` naturally; `ApiError`
//! renders the `{success: false, error: ...}` envelope with the
//! conventional status codes (400 missing params, 401 unauthenticated,
//! 500 on collaborator failure).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error envelope returned by every failing route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    /// Present on 401 responses so the caller can authenticate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Google Calendar authentication missing or expired
    #[error("Not authenticated with Google Calendar")]
    Unauthorized { auth_url: Option<String> },

    /// Invalid request data
    #[error("{0}")]
    BadRequest(String),

    /// Calendar collaborator failure
    #[error("Calendar error: {0}")]
    Calendar(String),

    /// Wallet collaborator failure
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Anything else
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn calendar(err: anyhow::Error) -> Self {
        ApiError::Calendar(format!("{err:#}"))
    }

    pub fn wallet(err: anyhow::Error) -> Self {
        ApiError::Wallet(format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, auth_url) = match &self {
            ApiError::Unauthorized { auth_url } => (StatusCode::UNAUTHORIZED, auth_url.clone()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            ApiError::Calendar(msg) | ApiError::Wallet(msg) => {
                tracing::error!("Collaborator error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let body = Json(ErrorBody {
            success: false,
            error: self.to_string(),
            auth_url,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
