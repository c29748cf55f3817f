//! 헬스 체크 endpoint.
//!
//! 로드밸런서나 오케스트레이션 시스템에서 사용됩니다.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded")
    pub status: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// 마지막 스냅샷 갱신 시각 (unix 초)
    pub last_updated: Option<i64>,

    /// 현재 WebSocket 연결 수
    pub connections: usize,

    /// 개별 컴포넌트 상태
    pub components: FeedComponents,
}

/// 피드 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedComponents {
    /// 공유 저장소 (Redis)
    pub store: ComponentStatus,

    /// 시세 스냅샷. 아직 갱신 전이면 "down"이지만 전체 상태에는 반영하지 않음
    pub snapshot: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// 상태 ("up" | "down")
    pub status: String,

    /// 추가 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    /// 정상 상태.
    pub fn up() -> Self {
        Self {
            status: "up".to_string(),
            message: None,
        }
    }

    /// 비정상 상태.
    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            message: Some(message.into()),
        }
    }

    fn up_with_info(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::up()
        }
    }
}

fn snapshot_status(last_updated: Option<i64>, now: i64) -> ComponentStatus {
    match last_updated {
        Some(ts) => ComponentStatus::up_with_info(format!("age {}s", (now - ts).max(0))),
        None => ComponentStatus::down("no snapshot yet"),
    }
}

/// 상세 헬스 체크.
///
/// 저장소에 닿지 못하면 503과 함께 "degraded"를 반환합니다.
/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, status_code, store) = if state.is_store_healthy().await {
        ("healthy", StatusCode::OK, ComponentStatus::up())
    } else {
        (
            "degraded",
            StatusCode::SERVICE_UNAVAILABLE,
            ComponentStatus::down("연결 실패"),
        )
    };

    let now = chrono::Utc::now();
    let last_updated = state.cache.get_last_updated().await.ok().flatten();

    let response = HealthResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: now.to_rfc3339(),
        last_updated,
        connections: state.broadcaster.connection_count().await,
        components: FeedComponents {
            store,
            snapshot: snapshot_status(last_updated, now.timestamp()),
        },
    };

    (status_code, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_returns_json() {
        let state = Arc::new(create_test_state().await);
        let app = Router::new().nest("/health", health_router()).with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "healthy");
        assert_eq!(health.components.store.status, "up");
        assert_eq!(health.components.snapshot.status, "up");
        assert!(health.last_updated.is_some());
        assert!(!health.version.is_empty());
    }

    #[test]
    fn test_snapshot_status() {
        let fresh = snapshot_status(Some(1_000), 1_030);
        assert_eq!(fresh.status, "up");
        assert_eq!(fresh.message.as_deref(), Some("age 30s"));

        assert_eq!(snapshot_status(None, 1_030).status, "down");
        assert_eq!(
            snapshot_status(Some(2_000), 1_000).message.as_deref(),
            Some("age 0s")
        );
    }

    #[test]
    fn test_component_status_variants() {
        let up = ComponentStatus::up();
        assert_eq!(up.status, "up");
        assert!(up.message.is_none());

        let down = ComponentStatus::down("error");
        assert_eq!(down.status, "down");
        assert_eq!(down.message, Some("error".to_string()));
    }
}
