//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! AppState는 Arc로 래핑되어 Axum의 State extractor를 통해 주입됩니다.

use std::sync::Arc;

use crate::service::{MarketService, ReportService};
use crate::websocket::SharedBroadcaster;
use feed_data::MarketDataCache;
use feed_notification::SubscriptionService;

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 시세 조회 서비스
    pub market: MarketService,

    /// 요청 시점 리포트 생성
    pub reports: ReportService,

    /// 예약 메일 구독
    pub subscriptions: SubscriptionService,

    /// 실시간 room 브로드캐스터
    pub broadcaster: SharedBroadcaster,

    /// 공유 시세 캐시
    pub cache: Arc<MarketDataCache>,

    /// 서버 시작 시각
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 새 상태를 생성합니다.
    pub fn new(
        market: MarketService,
        reports: ReportService,
        subscriptions: SubscriptionService,
        broadcaster: SharedBroadcaster,
    ) -> Self {
        let cache = Arc::clone(market.cache());
        Self {
            market,
            reports,
            subscriptions,
            broadcaster,
            cache,
            started_at: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
    }

    /// 공유 저장소 연결 상태.
    pub async fn is_store_healthy(&self) -> bool {
        self.cache.health_check().await.unwrap_or(false)
    }
}

/// 테스트용 상태. 스냅샷 3건과 EUR 환율이 들어 있습니다.
#[cfg(test)]
pub async fn create_test_state() -> AppState {
    use crate::service::tests::{seeded_cache, StubRenderer};
    use crate::websocket::RoomBroadcaster;
    use feed_notification::SubscriberRegistry;
    use std::time::Duration;

    let cache = seeded_cache().await;
    let market = MarketService::new(Arc::clone(&cache), Duration::from_secs(10));
    let reports = ReportService::new(
        market.clone(),
        Arc::new(StubRenderer::default()),
        Duration::from_secs(5),
    );
    let subscriptions = SubscriptionService::new(Arc::new(SubscriberRegistry::new()));
    let broadcaster = Arc::new(RoomBroadcaster::new(cache, 50, 64));

    AppState::new(market, reports, subscriptions, broadcaster)
}
