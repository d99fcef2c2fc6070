use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::payments::{gateway::GatewayError, teardown::TeardownError};
use crate::stats::StatsError;

const INTERNAL_MESSAGE: &str = "Internal Server Error!";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// Request could not be parsed; keeps the extractor's status (400, 415, 422).
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    /// Carries the failed operation for the log; clients only see the generic message.
    #[error("failed to {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Internal(_) | ApiError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ApiError::Internal(_) | ApiError::Other(_) => INTERNAL_MESSAGE.to_string(),
            other => {
                let msg = other.to_string();
                if msg.is_empty() {
                    INTERNAL_MESSAGE.to_string()
                } else {
                    msg
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %format!("{:#}", self), "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }
        let body = ErrorBody {
            success: false,
            message: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Other(anyhow::Error::new(e).context("database"))
    }
}

impl ApiError {
    fn rejected(status: StatusCode, message: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(message)
        } else {
            ApiError::Rejected { status, message }
        }
    }
}

macro_rules! rejection_into_api_error {
    ($($rejection:ty),+) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(r: $rejection) -> Self {
                    ApiError::rejected(r.status(), r.body_text())
                }
            }
        )+
    };
}

rejection_into_api_error!(JsonRejection, QueryRejection, PathRejection, FormRejection, MultipartRejection);

impl From<TeardownError> for ApiError {
    fn from(e: TeardownError) -> Self {
        ApiError::Other(anyhow::Error::new(e))
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError::Other(anyhow::Error::new(e).context("payment gateway"))
    }
}

impl From<StatsError> for ApiError {
    fn from(e: StatsError) -> Self {
        match e {
            StatsError::NoStatsRecord => ApiError::not_found("No stats recorded yet"),
            other => ApiError::Other(anyhow::Error::new(other)),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_renders_envelope() {
        let res = ApiError::not_found("Course Not Found").into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let json = body_json(res).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Course Not Found");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let res = ApiError::Other(anyhow::anyhow!("connection reset by peer")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(res).await;
        assert_eq!(json["message"], INTERNAL_MESSAGE);
    }

    #[test]
    fn empty_message_defaults_to_generic() {
        assert_eq!(ApiError::bad_request("").user_message(), INTERNAL_MESSAGE);
    }

    #[test]
    fn oversized_rejection_is_payload_too_large() {
        let err = ApiError::rejected(StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded".into());
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        let err = ApiError::rejected(StatusCode::UNPROCESSABLE_ENTITY, "missing field".into());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.user_message(), "missing field");
    }

    #[test]
    fn missing_stats_maps_to_not_found() {
        let err: ApiError = StatsError::NoStatsRecord.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
