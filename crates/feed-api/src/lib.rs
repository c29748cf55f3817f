//! REST 게이트웨이 및 실시간 WebSocket 푸시 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 통화 변환을 포함한 시세 조회 서비스
//! - room 기반 실시간 푸시 (상위 자산, 자산별 히스토리)
//! - 인스턴스 간 Redis pub/sub 버스
//! - 헬스 체크와 Prometheus 메트릭
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`service`]: 시세 조회/리포트 서비스
//! - [`routes`]: REST API 엔드포인트
//! - [`websocket`]: 실시간 WebSocket 서버
//! - [`metrics`]: Prometheus 메트릭 수집
//! - [`middleware`]: HTTP 미들웨어

pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod service;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use metrics::setup_metrics_recorder;
pub use middleware::metrics_layer;
pub use routes::create_api_router;
pub use service::{MarketService, ReportService};
pub use state::AppState;
pub use websocket::{
    spawn_bus_listener, start_top_aggregator, websocket_router, ClientMessage, RedisFanoutBus,
    RoomBroadcaster, RoomPoller, ServerMessage, WsError, WsState,
};
