//! 환율 테이블 갱신.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use super::RefreshJob;
use crate::{CollectorError, RefreshStats, Result};
use feed_data::{ExchangeRateProvider, MarketDataCache};

/// 환율 테이블을 가져와 통째로 교체합니다.
pub struct ExchangeRateRefreshJob {
    provider: Arc<dyn ExchangeRateProvider>,
    cache: Arc<MarketDataCache>,
}

impl ExchangeRateRefreshJob {
    /// 새 작업을 생성합니다.
    pub fn new(provider: Arc<dyn ExchangeRateProvider>, cache: Arc<MarketDataCache>) -> Self {
        Self { provider, cache }
    }
}

#[async_trait]
impl RefreshJob for ExchangeRateRefreshJob {
    fn name(&self) -> &'static str {
        "exchange_rate_refresh"
    }

    async fn run_once(&self) -> Result<RefreshStats> {
        let start = Instant::now();
        let mut stats = RefreshStats::new();

        let table = self.provider.fetch_rates().await?;
        if table.is_empty() {
            return Err(CollectorError::DataSource(format!(
                "{} returned an empty rate table",
                self.provider.name()
            )));
        }
        stats.fetched = table.len();

        let outcome = self.cache.save_exchange_rates(&table).await?;
        stats.record(outcome.is_written());

        stats.elapsed = start.elapsed();
        Ok(stats)
    }
}
