//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! HTTP 요청 메트릭과 실시간 푸시 메트릭을 수집하고 `/metrics` 엔드포인트로
//! 노출합니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설치하고 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .install_recorder()
}

// ============================================================================
// HTTP 메트릭 헬퍼 함수
// ============================================================================

/// HTTP 요청 카운터 증가.
pub fn record_http_request(method: &str, path: &str) {
    counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string())
        .increment(1);
}

/// HTTP 응답 카운터 증가.
pub fn record_http_response(method: &str, path: &str, status: u16) {
    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// HTTP 요청 지속 시간 기록.
pub fn record_http_duration(method: &str, path: &str, duration_secs: f64) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// 피드 메트릭 헬퍼 함수
// ============================================================================

/// 푸시 이벤트 카운터 증가.
pub fn record_push(event: &'static str) {
    counter!("feed_push_events_total", "event" => event).increment(1);
}

/// 리포트 생성 결과 카운터 증가.
pub fn record_report(kind: &str, success: bool) {
    counter!(
        "feed_reports_total",
        "kind" => kind.to_string(),
        "outcome" => if success { "ok" } else { "error" }
    )
    .increment(1);
}

/// WebSocket 연결 수 증가.
pub fn increment_websocket_connections() {
    gauge!("websocket_connections_active").increment(1.0);
}

/// WebSocket 연결 수 감소.
pub fn decrement_websocket_connections() {
    gauge!("websocket_connections_active").decrement(1.0);
}

// ============================================================================
// 경로 정규화 유틸리티
// ============================================================================

/// 자산 ID가 오는 경로 세그먼트 바로 앞의 세그먼트.
const ID_PARENTS: [&str; 2] = ["cryptos", "reports"];

/// 경로에서 동적 파라미터를 정규화합니다.
///
/// 예: `/api/cryptos/bitcoin/history` → `/api/cryptos/:id/history`
pub fn normalize_path(path: &str) -> String {
    let mut normalized = Vec::new();
    let mut previous = "";

    for segment in path.split('/') {
        if !segment.is_empty() && ID_PARENTS.contains(&previous) {
            normalized.push(":id");
        } else {
            normalized.push(segment);
        }
        previous = segment;
    }
    normalized.join("/")
}
