//! HTTP 요청 metrics middleware.
//!
//! Prometheus 스크레이프(`/metrics`)와 WebSocket 업그레이드(`/ws`)는 집계하지
//! 않습니다. WebSocket 연결은 별도 게이지로 추적됩니다.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{
    normalize_path, record_http_duration, record_http_request, record_http_response,
};

/// 집계에서 제외되는 경로.
const UNTRACKED_PATHS: &[&str] = &["/metrics", "/ws"];

fn is_tracked(path: &str) -> bool {
    !UNTRACKED_PATHS.contains(&path.trim_end_matches('/'))
}

/// 요청 수, 응답 상태, 처리 시간을 기록하는 미들웨어.
pub async fn metrics_layer(request: Request, next: Next) -> Response {
    let raw_path = request.uri().path();
    if !is_tracked(raw_path) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = normalize_path(raw_path);
    record_http_request(method.as_str(), &path);

    let started = Instant::now();
    let response = next.run(request).await;

    record_http_response(method.as_str(), &path, response.status().as_u16());
    record_http_duration(method.as_str(), &path, started.elapsed().as_secs_f64());

    response
}
