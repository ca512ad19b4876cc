use std::{any::Any, time::Duration};

use axum::{
    Json,
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::models::Platform;

/// Why a raw URL could not become a `VideoReference`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Unsupported video platform, only YouTube and Bilibili links are accepted")]
    UnsupportedPlatform,

    #[error("Could not extract a {platform} video id, check the link format")]
    MissingId { platform: Platform },
}

/// One strategy attempt that produced nothing usable. Never leaves the resolver.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream answered HTTP {status}")]
    Status { status: u16 },

    #[error("unexpected upstream payload: {0}")]
    Parse(String),

    #[error("upstream returned no usable download links")]
    Empty,

    #[error("upstream body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("extraction tool failed: {0}")]
    Tool(String),
}

impl From<serde_json::Error> for ExtractionError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            detail: None,
        }
    }

    /// 500 with a fixed public message. `detail` is only attached when
    /// `expose_detail` is set, otherwise a generic hint replaces it.
    pub fn internal(message: impl Into<String>, detail: impl Into<String>, expose_detail: bool) -> Self {
        let detail = detail.into();
        error!("internal error: {detail}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            detail: Some(if expose_detail {
                detail
            } else {
                "Internal server error".to_string()
            }),
        }
    }
}

impl From<ClassifyError> for ApiError {
    fn from(error: ClassifyError) -> Self {
        Self::bad_request(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            message: self.detail,
        });

        (self.status, body).into_response()
    }
}

/// Builds the `CatchPanicLayer` handler. The panic payload is echoed only
/// when `expose_detail` is set.
pub fn panic_responder(
    expose_detail: bool,
) -> impl Fn(Box<dyn Any + Send + 'static>) -> Response<Body> + Clone {
    move |payload: Box<dyn Any + Send + 'static>| {
        let detail = if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else {
            "handler panicked".to_string()
        };

        ApiError::internal("Failed to fetch video info", detail, expose_detail).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_errors_map_to_bad_request() {
        let error: ApiError = ClassifyError::MissingId {
            platform: Platform::Bilibili,
        }
        .into();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert!(error.message.contains("bilibili"));
        assert!(error.detail.is_none());
    }

    #[test]
    fn internal_detail_is_hidden_unless_enabled() {
        let hidden = ApiError::internal("Failed", "stack details", false);
        assert_eq!(hidden.detail.as_deref(), Some("Internal server error"));

        let shown = ApiError::internal("Failed", "stack details", true);
        assert_eq!(shown.detail.as_deref(), Some("stack details"));
    }

    #[test]
    fn panic_payload_becomes_500() {
        let responder = panic_responder(true);
        let response = responder(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
