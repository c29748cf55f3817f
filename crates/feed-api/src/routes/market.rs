//! 시세 조회 endpoint.
//!
//! 모든 금액은 `currency` 쿼리(기본 `usd`)로 변환되어 반환됩니다.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

use super::validated;
use crate::error::ApiResult;
use crate::state::AppState;
use feed_core::{CryptoCurrency, ExchangeRate, HistoryPoint, BASE_CURRENCY};

fn default_currency() -> String {
    BASE_CURRENCY.to_string()
}

fn default_quantity() -> usize {
    50
}

fn default_size() -> usize {
    50
}

/// 상위 자산 조회 쿼리.
#[derive(Debug, Deserialize, Validate)]
pub struct TopQuery {
    /// 통화 코드 (기본: usd)
    #[serde(default = "default_currency")]
    pub currency: String,
    /// 자산 수 (기본: 50)
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 250, message = "quantity는 1-250 사이여야 합니다"))]
    pub quantity: usize,
}

/// 통화 쿼리.
#[derive(Debug, Deserialize)]
pub struct CurrencyQuery {
    #[serde(default = "default_currency")]
    pub currency: String,
}

/// 히스토리 조회 쿼리.
#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[serde(default = "default_currency")]
    pub currency: String,
    /// 포인트 수 (기본: 50)
    #[serde(default = "default_size")]
    #[validate(range(min = 1, max = 1000, message = "size는 1-1000 사이여야 합니다"))]
    pub size: usize,
}

/// 목록 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub currency: String,
    pub items: Vec<T>,
}

/// 상위 자산 목록.
///
/// GET /api/cryptos?currency&quantity
pub async fn get_top_cryptos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopQuery>,
) -> ApiResult<Json<ListResponse<CryptoCurrency>>> {
    let query = validated(query)?;
    let items = state
        .market
        .get_top_cryptos(&query.currency, query.quantity)
        .await?;
    debug!(currency = %query.currency, items = items.len(), "Top assets served");

    Ok(Json(ListResponse {
        currency: query.currency.to_lowercase(),
        items,
    }))
}

/// 단일 자산.
///
/// GET /api/cryptos/{id}?currency
pub async fn get_crypto(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<CurrencyQuery>,
) -> ApiResult<Json<CryptoCurrency>> {
    Ok(Json(state.market.get_crypto_by_id(&id, &query.currency).await?))
}

/// 가격 히스토리 (오래된 순).
///
/// GET /api/cryptos/{id}/history?currency&size
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<ListResponse<HistoryPoint>>> {
    let query = validated(query)?;
    let items = state
        .market
        .get_price_history(&id, &query.currency, query.size)
        .await?;

    Ok(Json(ListResponse {
        currency: query.currency.to_lowercase(),
        items,
    }))
}

/// 환율 목록.
///
/// GET /api/exchange-rates
pub async fn get_exchange_rates(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ExchangeRate>>> {
    Ok(Json(state.market.get_exchange_rates().await?))
}

/// 시세 라우터.
pub fn market_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_top_cryptos))
        .route("/{id}", get(get_crypto))
        .route("/{id}/history", get(get_history))
}

/// 환율 라우터.
pub fn exchange_rates_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_exchange_rates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorResponse;
    use crate::state::create_test_state;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    async fn app() -> Router {
        Router::new()
            .nest("/api/cryptos", market_router())
            .nest("/api/exchange-rates", exchange_rates_router())
            .with_state(Arc::new(create_test_state().await))
    }

    async fn fetch(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_top_cryptos_default_currency() {
        let response = fetch(app().await, "/api/cryptos?quantity=2").await;
        assert_eq!(response.status(), StatusCode::OK);

        let list: ListResponse<CryptoCurrency> = body(response).await;
        assert_eq!(list.currency, "usd");
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].id, "bitcoin");
    }

    #[tokio::test]
    async fn test_top_cryptos_converted_to_eur() {
        let response = fetch(app().await, "/api/cryptos?currency=eur").await;
        let list: ListResponse<CryptoCurrency> = body(response).await;
        assert_eq!(list.items[0].current_price, dec!(90.0));
    }

    #[tokio::test]
    async fn test_quantity_out_of_range() {
        let response = fetch(app().await, "/api/cryptos?quantity=0").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let error: ApiErrorResponse = body(response).await;
        assert_eq!(error.code, "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_unknown_currency_is_bad_request() {
        let response = fetch(app().await, "/api/cryptos?currency=xyz").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let error: ApiErrorResponse = body(response).await;
        assert_eq!(error.code, "UNKNOWN_CURRENCY");
    }

    #[tokio::test]
    async fn test_crypto_by_id() {
        let response = fetch(app().await, "/api/cryptos/ethereum").await;
        assert_eq!(response.status(), StatusCode::OK);
        let crypto: CryptoCurrency = body(response).await;
        assert_eq!(crypto.current_price, dec!(10));

        let response = fetch(app().await, "/api/cryptos/dogecoin").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history() {
        let response = fetch(app().await, "/api/cryptos/bitcoin/history?currency=eur&size=10").await;
        assert_eq!(response.status(), StatusCode::OK);

        let list: ListResponse<HistoryPoint> = body(response).await;
        assert_eq!(list.currency, "eur");
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].price, dec!(90.0));
    }

    #[tokio::test]
    async fn test_exchange_rates() {
        let response = fetch(app().await, "/api/exchange-rates").await;
        let rates: Vec<ExchangeRate> = body(response).await;
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].rate, dec!(0.9));
    }
}
