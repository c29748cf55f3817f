//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크
//! - `/api/cryptos` - 상위 자산, 단일 자산, 가격 히스토리
//! - `/api/exchange-rates` - 환율 목록
//! - `/api/subscriptions` - 예약 메일 구독/해지
//! - `/api/reports/{kind}` - 요청 시점 리포트

pub mod health;
pub mod market;
pub mod reports;
pub mod subscriptions;

pub use health::{health_router, ComponentStatus, FeedComponents, HealthResponse};
pub use market::{exchange_rates_router, market_router};
pub use reports::reports_router;
pub use subscriptions::subscriptions_router;

use axum::Router;
use std::sync::Arc;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// 전체 API 라우터 생성.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/api/cryptos", market_router())
        .nest("/api/exchange-rates", exchange_rates_router())
        .nest("/api/subscriptions", subscriptions_router())
        .nest("/api/reports", reports_router())
}

/// 쿼리/본문을 검증합니다. 실패 메시지는 필드 순으로 합쳐집니다.
pub(crate) fn validated<T: Validate>(value: T) -> ApiResult<T> {
    if let Err(errors) = value.validate() {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let message = fields
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(m) => m.to_string(),
                    None => format!("{}: 유효하지 않은 값", field),
                })
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ApiError::BadRequest(message));
    }
    Ok(value)
}
