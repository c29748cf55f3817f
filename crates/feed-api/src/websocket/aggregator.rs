//! 상위 자산 어그리게이터.
//!
//! 시세 서비스의 주기 스트림을 받아 갱신 tick마다 브로드캐스터에 넘깁니다.
//! 상위 5개는 전체 연결로, 전체 목록은 집계 구독자 room으로 나갑니다.

use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::rooms::RoomBroadcaster;
use crate::service::MarketService;
use feed_core::BASE_CURRENCY;

/// 스트림을 소비해 브로드캐스터로 전달하는 어그리게이터.
pub struct TopAggregator {
    market: MarketService,
    broadcaster: Arc<RoomBroadcaster>,
    top_n: usize,
}

impl TopAggregator {
    /// 새 어그리게이터 생성.
    pub fn new(market: MarketService, broadcaster: Arc<RoomBroadcaster>, top_n: usize) -> Self {
        Self {
            market,
            broadcaster,
            top_n,
        }
    }

    /// 취소될 때까지 실행합니다.
    pub async fn run(self, shutdown_token: CancellationToken) {
        info!(top_n = self.top_n, "Top aggregator started");
        let mut stream = Box::pin(self.market.stream_top_cryptos(BASE_CURRENCY, self.top_n));

        loop {
            tokio::select! {
                biased;
                _ = shutdown_token.cancelled() => break,
                next = stream.next() => match next {
                    Some(records) if records.is_empty() => {
                        debug!("Snapshot empty, skipping broadcast");
                    }
                    Some(records) => self.broadcaster.on_refresh_tick(records).await,
                    None => break,
                },
            }
        }

        info!("Top aggregator stopped");
    }
}

/// 백그라운드에서 어그리게이터 실행.
pub fn start_top_aggregator(
    market: MarketService,
    broadcaster: Arc<RoomBroadcaster>,
    top_n: usize,
    shutdown_token: CancellationToken,
) -> JoinHandle<()> {
    let aggregator = TopAggregator::new(market, broadcaster, top_n);
    tokio::spawn(aggregator.run(shutdown_token))
}
