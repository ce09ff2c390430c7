//! REST API specific error handling utilities

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::kind::ClassifiedError;

/// REST-specific error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct RestErrorResponse {
    pub error: RestErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestErrorDetails {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

impl From<&ClassifiedError> for RestErrorResponse {
    fn from(error: &ClassifiedError) -> Self {
        let suggestions = error.kind.default_suggestions();
        Self {
            error: RestErrorDetails {
                code: error.kind.code().to_string(),
                message: error.message.clone(),
                retryable: error.is_retryable(),
                retry_after_seconds: error.retry_after_seconds,
                timestamp: error.timestamp,
                suggestions: (!suggestions.is_empty()).then_some(suggestions),
            },
        }
    }
}

impl IntoResponse for ClassifiedError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = RestErrorResponse::from(&self);

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after_seconds {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
