//! 시세 스냅샷 및 가격 히스토리 갱신.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::RefreshJob;
use crate::{CollectorError, RefreshStats, Result};
use feed_core::{history_batch, BASE_CURRENCY};
use feed_data::{MarketDataCache, MarketDataProvider};

/// 기준 통화로 상위 자산 시세를 가져와 스냅샷과 히스토리에 기록합니다.
pub struct PriceRefreshJob {
    provider: Arc<dyn MarketDataProvider>,
    cache: Arc<MarketDataCache>,
    quantity: usize,
}

impl PriceRefreshJob {
    /// 새 작업을 생성합니다.
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        cache: Arc<MarketDataCache>,
        quantity: usize,
    ) -> Self {
        Self {
            provider,
            cache,
            quantity,
        }
    }
}

#[async_trait]
impl RefreshJob for PriceRefreshJob {
    fn name(&self) -> &'static str {
        "price_refresh"
    }

    async fn run_once(&self) -> Result<RefreshStats> {
        let start = Instant::now();
        let mut stats = RefreshStats::new();

        let records = self.provider.fetch_top(BASE_CURRENCY, self.quantity).await?;
        if records.is_empty() {
            // 빈 응답으로 정상 스냅샷을 덮어쓰지 않는다
            return Err(CollectorError::DataSource(format!(
                "{} returned no market records",
                self.provider.name()
            )));
        }
        stats.fetched = records.len();

        let snapshot = self.cache.save_snapshot(&records).await?;
        stats.record(snapshot.is_written());

        let points = history_batch(&records, Utc::now().timestamp());
        let history = self.cache.save_history_point(&points).await?;
        stats.record(history.is_written());

        debug!(
            provider = self.provider.name(),
            records = records.len(),
            "Price refresh applied"
        );

        stats.elapsed = start.elapsed();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_core::CryptoCurrency;
    use feed_data::{
        keys, lock_name, CacheSettings, DataError, LockManager, MemoryStore,
        Result as DataResult,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct StubProvider {
        fail: AtomicBool,
    }

    fn record(id: &str, price: Decimal) -> CryptoCurrency {
        CryptoCurrency {
            id: id.to_string(),
            symbol: id.to_string(),
            name: id.to_string(),
            image: String::new(),
            current_price: price,
            market_cap: None,
            market_cap_rank: None,
            fully_diluted_valuation: None,
            total_volume: None,
            high_24h: None,
            low_24h: None,
            price_change_24h: None,
            price_change_percentage_24h: None,
            last_updated: None,
        }
    }

    #[async_trait]
    impl MarketDataProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn fetch_top(&self, currency: &str, quantity: usize) -> DataResult<Vec<CryptoCurrency>> {
            assert_eq!(currency, "usd");
            if self.fail.load(Ordering::SeqCst) {
                return Err(DataError::Timeout("upstream".to_string()));
            }
            Ok(vec![record("bitcoin", dec!(65000)), record("ethereum", dec!(3200))]
                .into_iter()
                .take(quantity)
                .collect())
        }
    }

    fn setup() -> (Arc<MemoryStore>, Arc<MarketDataCache>, Arc<StubProvider>) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MarketDataCache::new(store.clone(), CacheSettings::default()));
        let provider = Arc::new(StubProvider {
            fail: AtomicBool::new(false),
        });
        (store, cache, provider)
    }

    #[tokio::test]
    async fn test_refresh_writes_snapshot_and_history() {
        let (_, cache, provider) = setup();
        let job = PriceRefreshJob::new(provider, cache.clone(), 50);

        let stats = job.run_once().await.unwrap();

        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.written, 2);
        assert_eq!(cache.get_snapshot().await.unwrap().len(), 2);
        assert_eq!(cache.get_history("ethereum", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_last_good_value() {
        let (_, cache, provider) = setup();
        let job = PriceRefreshJob::new(provider.clone(), cache.clone(), 50);
        job.run_once().await.unwrap();

        provider.fail.store(true, Ordering::SeqCst);
        let err = job.run_once().await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(cache.get_snapshot().await.unwrap().len(), 2);
        assert_eq!(cache.history_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lock_contention_skips_snapshot() {
        let (store, cache, provider) = setup();
        let sibling = LockManager::new(store.clone());
        let _held = sibling
            .acquire(&lock_name(keys::SNAPSHOT), Duration::from_secs(30))
            .await
            .unwrap();

        let stats = PriceRefreshJob::new(provider, cache.clone(), 50)
            .run_once()
            .await
            .unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.written, 1);
        assert!(cache.get_snapshot().await.unwrap().is_empty());
    }
}
