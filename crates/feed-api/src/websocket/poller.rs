//! 활성 room 폴러.
//!
//! 주기마다 참조 카운트가 있는 room에 최근 히스토리를 푸시하고, 카운트가
//! 0이 된 room은 삭제합니다. room 하나의 실패는 나머지 room에 영향을 주지
//! 않습니다.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::messages::ServerMessage;
use super::rooms::RoomBroadcaster;
use feed_core::PeriodicTask;

/// 한 번의 폴링 결과.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    /// 업데이트를 보낸 room 수
    pub pushed: usize,
    /// 삭제된 room 수
    pub pruned: usize,
    /// 히스토리 조회에 실패한 room 수
    pub failed: usize,
}

/// room 폴러.
pub struct RoomPoller {
    broadcaster: Arc<RoomBroadcaster>,
}

impl RoomPoller {
    /// 새 폴러를 생성합니다.
    pub fn new(broadcaster: Arc<RoomBroadcaster>) -> Self {
        Self { broadcaster }
    }

    /// 모든 room을 한 번 순회합니다.
    pub async fn poll_once(&self) -> PollSummary {
        let mut summary = PollSummary::default();
        let rooms = self.broadcaster.active_rooms().await;
        let limit = self.broadcaster.history_limit();

        let active = rooms.iter().filter(|(_, count)| *count > 0).count();
        if active > 0 {
            debug!(active, "Polling active rooms");
        }

        for (room, count) in rooms {
            if count == 0 {
                if self.broadcaster.prune_room(&room).await {
                    summary.pruned += 1;
                }
                continue;
            }

            let history = self
                .broadcaster
                .cache()
                .get_history(&room, limit)
                .instrument(feed_core::asset_span!("room_poll", room));
            match history.await {
                Ok(points) => {
                    debug!(room = %room, points = points.len(), "crypto_update → room");
                    self.broadcaster
                        .emit_to_room(&room, ServerMessage::CryptoUpdate {
                            room: room.clone(),
                            points,
                        })
                        .await;
                    summary.pushed += 1;
                }
                Err(e) => {
                    warn!(room = %room, error = %e, "Room poll failed");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// 주기 작업으로 실행합니다.
    pub fn start(self, period: Duration, shutdown_token: CancellationToken) -> JoinHandle<()> {
        let poller = Arc::new(self);
        info!(period_secs = period.as_secs(), "Room poller starting");
        PeriodicTask::new("room_poller", period, shutdown_token).spawn(move || {
            let poller = Arc::clone(&poller);
            async move {
                poller.poll_once().await;
            }
        })
    }
}
