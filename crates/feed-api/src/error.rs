//! 통합 API 에러 응답 타입.
//!
//! 하위 크레이트의 에러를 HTTP 상태 코드와 JSON 본문으로 변환합니다.
//!
//! ```json
//! {
//!   "code": "UNKNOWN_CURRENCY",
//!   "message": "지원하지 않는 통화: xyz",
//!   "timestamp": 1738300800
//! }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use feed_core::FeedError;
use feed_data::DataError;
use feed_notification::NotificationError;

/// API 에러 응답 본문.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "NOT_FOUND", "UNKNOWN_CURRENCY")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 에러 발생 타임스탬프 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 타임스탬프를 포함한 에러 응답을 생성합니다.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }
}

/// API 에러.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error("잘못된 요청: {0}")]
    BadRequest(String),

    #[error("찾을 수 없음: {0}")]
    NotFound(String),
}

/// API 핸들러 Result 타입.
pub type ApiResult<T> = Result<T, ApiError>;

fn data_status(err: &DataError) -> (StatusCode, &'static str) {
    match err {
        DataError::ConnectionError(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
        DataError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
        DataError::FetchError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "DATA_ERROR"),
    }
}

impl ApiError {
    /// HTTP 상태 코드와 에러 코드.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Feed(e) => match e {
                FeedError::UnknownCurrency(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_CURRENCY"),
                FeedError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                FeedError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::Data(e) => data_status(e),
            ApiError::Notification(e) => match e {
                NotificationError::Render(_) => (StatusCode::BAD_GATEWAY, "RENDER_FAILED"),
                NotificationError::Delivery(_) => (StatusCode::BAD_GATEWAY, "DELIVERY_FAILED"),
                NotificationError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
                NotificationError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                NotificationError::Data(inner) => data_status(inner),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            error!(%status, code, error = %self, "Request failed");
        }
        (status, Json(ApiErrorResponse::new(code, self.to_string()))).into_response()
    }
}
