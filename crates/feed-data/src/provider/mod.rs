//! 상류 데이터 Provider 모듈.
//!
//! ## CoinGecko
//! - `CoinGeckoProvider`: `coins/markets` 시가총액 상위 자산 시세
//!
//! ## 환율
//! - `ExchangeRateApiProvider`: 기준 통화(usd) 대비 환율 테이블

pub mod coingecko;
pub mod exchange_rate;

use async_trait::async_trait;

use crate::error::Result;
use feed_core::{CryptoCurrency, ExchangeRateTable};

pub use coingecko::CoinGeckoProvider;
pub use exchange_rate::ExchangeRateApiProvider;

/// 시세 Provider.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider 이름.
    fn name(&self) -> &str;

    /// 시가총액 상위 `quantity`개 자산을 `currency` 기준으로 가져옵니다.
    async fn fetch_top(&self, currency: &str, quantity: usize) -> Result<Vec<CryptoCurrency>>;
}

/// 환율 Provider.
#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// Provider 이름.
    fn name(&self) -> &str;

    /// 기준 통화 대비 환율 테이블을 가져옵니다.
    async fn fetch_rates(&self) -> Result<ExchangeRateTable>;
}
