//! 요청 시점 리포트 endpoint.
//!
//! 렌더러가 만든 파일을 그대로 내려주며, 렌더러 실패는 502로 응답합니다.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::info;

use super::market::CurrencyQuery;
use crate::error::ApiResult;
use crate::metrics::record_report;
use crate::state::AppState;
use feed_notification::ReportKind;

/// 리포트 생성.
///
/// GET /api/reports/{kind}?currency
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<CurrencyQuery>,
) -> ApiResult<impl IntoResponse> {
    let kind: ReportKind = kind.parse()?;

    let result = state.reports.generate(kind, &query.currency).await;
    record_report(kind.as_str(), result.is_ok());
    let artifact = result?;

    info!(
        kind = %kind,
        currency = %query.currency,
        bytes = artifact.content.len(),
        "Report generated"
    );

    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.filename),
            ),
        ],
        artifact.content,
    ))
}

/// 리포트 라우터.
pub fn reports_router() -> Router<Arc<AppState>> {
    Router::new().route("/{kind}", get(get_report))
}
