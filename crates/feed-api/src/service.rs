//! 시세 조회/리포트 서비스 계층.
//!
//! 캐시에 저장된 기준 통화(USD) 값을 요청 통화로 변환해 돌려줍니다.
//! 변환은 `기준값 × 환율` 이며 USD의 환율은 항상 1입니다.

use futures::stream::{self, Stream};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use feed_core::{CryptoCurrency, ExchangeRate, FeedError, HistoryPoint, BASE_CURRENCY};
use feed_data::MarketDataCache;
use feed_notification::{ReportArtifact, ReportKind, Renderer};

/// 시세 조회 서비스.
#[derive(Clone)]
pub struct MarketService {
    cache: Arc<MarketDataCache>,
    stream_interval: Duration,
}

impl MarketService {
    /// 새 서비스를 생성합니다.
    pub fn new(cache: Arc<MarketDataCache>, stream_interval: Duration) -> Self {
        Self {
            cache,
            stream_interval,
        }
    }

    /// 공유 캐시.
    pub fn cache(&self) -> &Arc<MarketDataCache> {
        &self.cache
    }

    /// 통화의 환율 계수. 기준 통화는 환율 테이블을 읽지 않습니다.
    pub async fn rate_factor(&self, currency: &str) -> ApiResult<Decimal> {
        if currency.eq_ignore_ascii_case(BASE_CURRENCY) {
            return Ok(Decimal::ONE);
        }
        let table = self.cache.get_exchange_rates().await?;
        Ok(table.factor(currency)?)
    }

    /// 상위 자산 목록.
    pub async fn get_top_cryptos(
        &self,
        currency: &str,
        quantity: usize,
    ) -> ApiResult<Vec<CryptoCurrency>> {
        let factor = self.rate_factor(currency).await?;
        let snapshot = self.cache.get_snapshot().await?;

        Ok(snapshot
            .iter()
            .take(quantity)
            .map(|c| c.converted(factor))
            .collect())
    }

    /// 자산 한 건.
    pub async fn get_crypto_by_id(&self, id: &str, currency: &str) -> ApiResult<CryptoCurrency> {
        let factor = self.rate_factor(currency).await?;
        let snapshot = self.cache.get_snapshot().await?;

        snapshot
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.converted(factor))
            .ok_or_else(|| ApiError::Feed(FeedError::NotFound(id.to_string())))
    }

    /// 자산의 최근 가격 히스토리 (오래된 순).
    pub async fn get_price_history(
        &self,
        id: &str,
        currency: &str,
        size: usize,
    ) -> ApiResult<Vec<HistoryPoint>> {
        let factor = self.rate_factor(currency).await?;
        let points = self.cache.get_history(id, size).await?;

        Ok(points.iter().map(|p| p.converted(factor)).collect())
    }

    /// 환율 목록 (통화 코드 순).
    pub async fn get_exchange_rates(&self) -> ApiResult<Vec<ExchangeRate>> {
        Ok(self.cache.get_exchange_rates().await?.to_rates())
    }

    /// 고정 주기마다 상위 자산을 내보내는 스트림.
    ///
    /// 첫 항목은 즉시 나옵니다. 조회에 실패한 주기는 건너뛰며, 스트림은
    /// drop될 때까지 끝나지 않습니다.
    pub fn stream_top_cryptos(
        &self,
        currency: &str,
        quantity: usize,
    ) -> impl Stream<Item = Vec<CryptoCurrency>> + Send + 'static {
        let mut ticker = interval(self.stream_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let state = (self.clone(), currency.to_string(), ticker);

        stream::unfold(state, move |(service, currency, mut ticker)| async move {
            loop {
                ticker.tick().await;
                match service.get_top_cryptos(&currency, quantity).await {
                    Ok(records) => {
                        debug!(records = records.len(), "Top assets stream tick");
                        return Some((records, (service, currency, ticker)));
                    }
                    Err(e) => warn!(error = %e, "Top assets stream tick failed"),
                }
            }
        })
    }
}

/// 요청 시점 리포트 생성 서비스.
#[derive(Clone)]
pub struct ReportService {
    market: MarketService,
    renderer: Arc<dyn Renderer>,
    timeout: Duration,
}

impl ReportService {
    /// 새 서비스를 생성합니다.
    pub fn new(market: MarketService, renderer: Arc<dyn Renderer>, timeout: Duration) -> Self {
        Self {
            market,
            renderer,
            timeout,
        }
    }

    /// 리포트를 생성합니다. 데이터셋은 렌더링 전에 요청 통화로 변환됩니다.
    pub async fn generate(&self, kind: ReportKind, currency: &str) -> ApiResult<ReportArtifact> {
        let currency = currency.to_lowercase();
        let records = self
            .market
            .get_top_cryptos(&currency, kind.quantity())
            .await?;

        let artifact = tokio::time::timeout(
            self.timeout,
            self.renderer.render(kind, &currency, &records),
        )
        .await
        .map_err(|_| {
            ApiError::Notification(feed_notification::NotificationError::Timeout(format!(
                "renderer ({:?})",
                self.timeout
            )))
        })??;

        Ok(artifact)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use feed_core::ExchangeRateTable;
    use feed_data::{CacheSettings, MemoryStore};
    use feed_notification::{NotificationError, NotificationResult};
    use futures::StreamExt;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    pub fn record(id: &str, price: Decimal) -> CryptoCurrency {
        CryptoCurrency {
            id: id.to_string(),
            symbol: id.to_string(),
            name: id.to_string(),
            image: String::new(),
            current_price: price,
            market_cap: Some(price * dec!(1000)),
            market_cap_rank: None,
            fully_diluted_valuation: None,
            total_volume: None,
            high_24h: None,
            low_24h: None,
            price_change_24h: None,
            price_change_percentage_24h: Some(dec!(1.5)),
            last_updated: None,
        }
    }

    pub async fn seeded_cache() -> Arc<MarketDataCache> {
        let cache = MarketDataCache::new(Arc::new(MemoryStore::new()), CacheSettings::default());
        cache
            .save_snapshot(&[
                record("bitcoin", dec!(100)),
                record("ethereum", dec!(10)),
                record("solana", dec!(1)),
            ])
            .await
            .unwrap();
        cache
            .save_history_point(&[HistoryPoint {
                id: "bitcoin".to_string(),
                timestamp: 1,
                price: dec!(100),
            }])
            .await
            .unwrap();
        cache
            .save_exchange_rates(&ExchangeRateTable::new(vec![("eur".to_string(), dec!(0.9))]))
            .await
            .unwrap();
        Arc::new(cache)
    }

    async fn service() -> MarketService {
        MarketService::new(seeded_cache().await, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_top_cryptos_converted() {
        let service = service().await;

        let usd = service.get_top_cryptos("usd", 2).await.unwrap();
        assert_eq!(usd.len(), 2);
        assert_eq!(usd[0].current_price, dec!(100));

        let eur = service.get_top_cryptos("EUR", 50).await.unwrap();
        assert_eq!(eur.len(), 3);
        assert_eq!(eur[0].current_price, dec!(90.0));
        assert_eq!(eur[0].market_cap, Some(dec!(90000.0)));
    }

    #[tokio::test]
    async fn test_unknown_currency() {
        let service = service().await;
        let err = service.get_top_cryptos("xyz", 5).await.unwrap_err();
        assert!(matches!(err, ApiError::Feed(FeedError::UnknownCurrency(_))));
    }

    #[tokio::test]
    async fn test_crypto_by_id_and_history() {
        let service = service().await;

        let eth = service.get_crypto_by_id("ethereum", "eur").await.unwrap();
        assert_eq!(eth.current_price, dec!(9.0));
        assert!(matches!(
            service.get_crypto_by_id("dogecoin", "usd").await,
            Err(ApiError::Feed(FeedError::NotFound(_)))
        ));

        let history = service.get_price_history("bitcoin", "eur", 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, dec!(90.0));
        assert!(service.get_price_history("dogecoin", "usd", 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_rates() {
        let rates = service().await.get_exchange_rates().await.unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].currency, "eur");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_emits_per_interval() {
        let service = service().await;
        let mut stream = Box::pin(service.stream_top_cryptos("usd", 2));

        let first = stream.next().await.unwrap();
        assert_eq!(first.len(), 2);

        let started = tokio::time::Instant::now();
        let second = stream.next().await.unwrap();
        assert_eq!(second.len(), 2);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    /// 받은 데이터셋을 기록하는 렌더러.
    #[derive(Default)]
    pub struct StubRenderer {
        pub seen: Mutex<Vec<(ReportKind, String, usize, Decimal)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Renderer for StubRenderer {
        async fn render(
            &self,
            kind: ReportKind,
            currency: &str,
            records: &[CryptoCurrency],
        ) -> NotificationResult<ReportArtifact> {
            if self.fail {
                return Err(NotificationError::Render("renderer down".to_string()));
            }
            let first_price = records.first().map(|r| r.current_price).unwrap_or_default();
            self.seen
                .lock()
                .unwrap()
                .push((kind, currency.to_string(), records.len(), first_price));
            Ok(ReportArtifact {
                kind,
                filename: kind.default_filename(currency),
                content_type: kind.content_type().to_string(),
                content: b"report".to_vec(),
            })
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_report_generation_converts_dataset() {
        let renderer = Arc::new(StubRenderer::default());
        let reports = ReportService::new(service().await, renderer.clone(), Duration::from_secs(5));

        let artifact = reports.generate(ReportKind::Executive, "EUR").await.unwrap();
        assert_eq!(artifact.filename, "executive_report_eur.pdf");

        let seen = renderer.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            (ReportKind::Executive, "eur".to_string(), 3, dec!(90.0))
        );
    }

    #[tokio::test]
    async fn test_report_failure_surfaces() {
        let renderer = Arc::new(StubRenderer {
            fail: true,
            ..Default::default()
        });
        let reports = ReportService::new(service().await, renderer, Duration::from_secs(5));

        let err = reports.generate(ReportKind::Graph, "usd").await.unwrap_err();
        assert!(matches!(err, ApiError::Notification(NotificationError::Render(_))));
    }
}
