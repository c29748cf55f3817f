//! 예약 메일 구독 endpoint.
//!
//! 검증 실패도 200 응답의 `success: false`로 돌려줍니다.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use crate::state::AppState;
use feed_notification::SubscribeResponse;

/// 구독 요청 본문. 범위 검증은 서비스에서 수행합니다.
#[derive(Debug, Deserialize)]
pub struct SubscribeBody {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub hour: i32,
    #[serde(default)]
    pub minute: i32,
}

/// 해지 요청 본문.
#[derive(Debug, Deserialize)]
pub struct UnsubscribeBody {
    #[serde(default)]
    pub email: String,
}

/// 구독 등록.
///
/// POST /api/subscriptions
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscribeBody>,
) -> Json<SubscribeResponse> {
    Json(
        state
            .subscriptions
            .subscribe_email(&body.email, body.hour, body.minute)
            .await,
    )
}

/// 구독 해지.
///
/// DELETE /api/subscriptions
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UnsubscribeBody>,
) -> Json<SubscribeResponse> {
    Json(state.subscriptions.unsubscribe_email(&body.email).await)
}

/// 구독 라우터.
pub fn subscriptions_router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(subscribe).delete(unsubscribe))
}
