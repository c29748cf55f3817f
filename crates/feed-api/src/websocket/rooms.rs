//! 실시간 room 브로드캐스터.
//!
//! 연결별 room 멤버십과 room별 참조 카운트를 관리하고, 갱신 tick마다 상위
//! 자산을 푸시합니다. 모든 메시지는 하나의 broadcast 채널로 흐르며 각 연결의
//! 송신 태스크가 `should_receive`로 걸러냅니다.
//!
//! 참조 카운트는 멤버십 기준입니다. 같은 연결이 같은 room에 두 번 들어가도
//! 한 번만 세고, 연결이 끊기면 그 연결이 속한 모든 room에서 빠집니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::bus::FanoutBus;
use super::messages::{Audience, Envelope, ServerMessage, WsError};
use crate::metrics::record_push;
use feed_core::CryptoCurrency;
use feed_data::MarketDataCache;

/// 상위 N 집계 구독자 room.
pub const TOP_AGGREGATE_ROOM: &str = "top_n_subscribers";

/// 전체 연결에 푸시하는 상위 자산 수.
pub const TOP_FIVE: usize = 5;

/// room 이름 최대 길이.
const MAX_ROOM_LEN: usize = 128;

/// 연결 하나의 멤버십.
#[derive(Debug, Default)]
struct ConnectionRooms {
    rooms: HashSet<String>,
}

#[derive(Debug, Default)]
struct RoomTable {
    connections: HashMap<String, ConnectionRooms>,
    refcounts: HashMap<String, usize>,
}

impl RoomTable {
    fn add_member(&mut self, conn_id: &str, room: &str) -> Result<usize, WsError> {
        let connection = self
            .connections
            .get_mut(conn_id)
            .ok_or_else(|| WsError::UnknownConnection(conn_id.to_string()))?;

        let count = self.refcounts.entry(room.to_string()).or_insert(0);
        if connection.rooms.insert(room.to_string()) {
            *count += 1;
        }
        Ok(*count)
    }

    fn remove_member(&mut self, conn_id: &str, room: &str) -> usize {
        let removed = self
            .connections
            .get_mut(conn_id)
            .map(|c| c.rooms.remove(room))
            .unwrap_or(false);

        match self.refcounts.get_mut(room) {
            Some(count) => {
                if removed {
                    *count = count.saturating_sub(1);
                }
                *count
            }
            None => 0,
        }
    }
}

/// 최근 tick의 상위 자산.
#[derive(Debug, Default)]
struct LatestRecords {
    top5: Vec<CryptoCurrency>,
    top_n: Vec<CryptoCurrency>,
}

/// room 브로드캐스터.
pub struct RoomBroadcaster {
    tx: broadcast::Sender<Envelope>,
    table: RwLock<RoomTable>,
    latest: RwLock<LatestRecords>,
    cache: Arc<MarketDataCache>,
    bus: Option<Arc<dyn FanoutBus>>,
    history_limit: usize,
}

/// 공유 가능한 브로드캐스터 타입.
pub type SharedBroadcaster = Arc<RoomBroadcaster>;

impl RoomBroadcaster {
    /// 새 브로드캐스터를 생성합니다.
    ///
    /// # Arguments
    ///
    /// * `capacity` - 브로드캐스트 채널 버퍼 크기
    pub fn new(cache: Arc<MarketDataCache>, history_limit: usize, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            table: RwLock::new(RoomTable::default()),
            latest: RwLock::new(LatestRecords::default()),
            cache,
            bus: None,
            history_limit,
        }
    }

    /// 인스턴스 간 버스를 설정합니다.
    pub fn with_bus(mut self, bus: Arc<dyn FanoutBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// 버스 사용 여부.
    pub fn has_bus(&self) -> bool {
        self.bus.is_some()
    }

    /// room 업데이트에 포함하는 히스토리 포인트 수.
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// 공유 캐시.
    pub fn cache(&self) -> &Arc<MarketDataCache> {
        &self.cache
    }

    // ==================== 연결 관리 ====================

    /// 새 연결을 등록하고 수신기를 반환합니다.
    pub async fn register(&self, conn_id: &str) -> broadcast::Receiver<Envelope> {
        let rx = self.tx.subscribe();
        self.table
            .write()
            .await
            .connections
            .insert(conn_id.to_string(), ConnectionRooms::default());
        rx
    }

    /// 연결을 제거합니다. 속해 있던 모든 room의 카운트가 감소합니다.
    pub async fn unregister(&self, conn_id: &str) {
        let mut table = self.table.write().await;
        let Some(connection) = table.connections.remove(conn_id) else {
            return;
        };

        for room in &connection.rooms {
            if let Some(count) = table.refcounts.get_mut(room) {
                *count = count.saturating_sub(1);
            }
        }
        debug!(conn_id, rooms = connection.rooms.len(), "Connection unregistered");
    }

    /// 새 연결에 캐시된 상위 5개를 보냅니다.
    pub async fn on_connect(&self, conn_id: &str) {
        let top5 = self.latest.read().await.top5.clone();
        if !top5.is_empty() {
            self.send_to_connection(conn_id, ServerMessage::Top5Update { records: top5 });
            debug!(conn_id, "Replayed cached top5");
        }
    }

    /// 연결이 메시지를 받아야 하는지 확인합니다.
    pub async fn should_receive(&self, conn_id: &str, envelope: &Envelope) -> bool {
        let table = self.table.read().await;
        let Some(connection) = table.connections.get(conn_id) else {
            return false;
        };

        match &envelope.audience {
            Audience::All => true,
            Audience::Room(room) => connection.rooms.contains(room),
            Audience::Connection(target) => target == conn_id,
        }
    }

    // ==================== 집계 구독 ====================

    /// 상위 N 집계 room에 들어가고 캐시된 값을 호출자에게만 보냅니다.
    pub async fn subscribe_top_aggregate(&self, conn_id: &str) -> Result<(), WsError> {
        {
            let mut table = self.table.write().await;
            table
                .connections
                .get_mut(conn_id)
                .ok_or_else(|| WsError::UnknownConnection(conn_id.to_string()))?
                .rooms
                .insert(TOP_AGGREGATE_ROOM.to_string());
        }
        info!(conn_id, "Subscribed to top aggregate");

        let top_n = self.latest.read().await.top_n.clone();
        if !top_n.is_empty() {
            self.send_to_connection(conn_id, ServerMessage::TopNUpdate { records: top_n });
        }
        Ok(())
    }

    /// 상위 N 집계 room에서 나갑니다.
    pub async fn unsubscribe_top_aggregate(&self, conn_id: &str) {
        let mut table = self.table.write().await;
        if let Some(connection) = table.connections.get_mut(conn_id) {
            connection.rooms.remove(TOP_AGGREGATE_ROOM);
        }
        info!(conn_id, "Unsubscribed from top aggregate");
    }

    // ==================== 자산 room ====================

    /// room에 들어가고 최근 히스토리를 호출자에게만 보냅니다.
    ///
    /// 히스토리 조회가 실패하거나 비어 있으면 빈 목록을 보냅니다.
    /// 갱신된 참조 카운트를 반환합니다.
    pub async fn join_room(&self, conn_id: &str, room: &str) -> Result<usize, WsError> {
        validate_room(room)?;

        let count = self.table.write().await.add_member(conn_id, room)?;
        info!(conn_id, room, total = count, "Joined room");

        let points = match self.cache.get_history(room, self.history_limit).await {
            Ok(points) => points,
            Err(e) => {
                warn!(room, error = %e, "History lookup failed, sending empty update");
                Vec::new()
            }
        };
        self.send_to_connection(
            conn_id,
            ServerMessage::CryptoUpdate {
                room: room.to_string(),
                points,
            },
        );

        Ok(count)
    }

    /// room에서 나갑니다. 남은 참조 카운트를 반환합니다 (0 미만으로 내려가지 않음).
    pub async fn leave_room(&self, conn_id: &str, room: &str) -> usize {
        let count = self.table.write().await.remove_member(conn_id, room);
        info!(conn_id, room, total = count, "Left room");
        count
    }

    /// room의 참조 카운트. 추적 중이 아니면 `None`.
    pub async fn refcount(&self, room: &str) -> Option<usize> {
        self.table.read().await.refcounts.get(room).copied()
    }

    /// 추적 중인 모든 room과 참조 카운트 (이름 순).
    pub async fn active_rooms(&self) -> Vec<(String, usize)> {
        let mut rooms: Vec<(String, usize)> = self
            .table
            .read()
            .await
            .refcounts
            .iter()
            .map(|(room, count)| (room.clone(), *count))
            .collect();
        rooms.sort();
        rooms
    }

    /// 참조 카운트가 0인 room을 삭제합니다. 삭제했으면 `true`.
    pub async fn prune_room(&self, room: &str) -> bool {
        let mut table = self.table.write().await;
        if table.refcounts.get(room) == Some(&0) {
            table.refcounts.remove(room);
            debug!(room, "Room pruned");
            true
        } else {
            false
        }
    }

    /// 연결된 클라이언트 수.
    pub async fn connection_count(&self) -> usize {
        self.table.read().await.connections.len()
    }

    // ==================== 발행 ====================

    /// 갱신 tick 처리: 상위 자산을 캐시하고 푸시합니다.
    ///
    /// 상위 5개는 모든 연결에, 전체 목록은 집계 구독자에게만 보냅니다.
    pub async fn on_refresh_tick(&self, records: Vec<CryptoCurrency>) {
        let top5: Vec<CryptoCurrency> = records.iter().take(TOP_FIVE).cloned().collect();
        {
            let mut latest = self.latest.write().await;
            latest.top5 = top5.clone();
            latest.top_n = records.clone();
        }

        info!(records = records.len(), "Broadcasting top assets");
        self.emit(Audience::All, ServerMessage::Top5Update { records: top5 })
            .await;
        self.emit(
            Audience::Room(TOP_AGGREGATE_ROOM.to_string()),
            ServerMessage::TopNUpdate { records },
        )
        .await;
    }

    /// room 멤버에게 메시지를 보냅니다 (버스가 있으면 버스 경유).
    pub async fn emit_to_room(&self, room: &str, message: ServerMessage) {
        self.emit(Audience::Room(room.to_string()), message).await;
    }

    /// 전체/room 대상 메시지를 발행합니다.
    ///
    /// 버스 발행이 실패하면 로컬 연결에라도 전달합니다.
    async fn emit(&self, audience: Audience, message: ServerMessage) {
        let envelope = Envelope::new(audience, message);
        record_push(envelope.message.event());
        match &self.bus {
            Some(bus) => {
                if let Err(e) = bus.publish(&envelope).await {
                    warn!(error = %e, "Bus publish failed, delivering locally");
                    self.deliver_local(envelope);
                }
            }
            None => self.deliver_local(envelope),
        }
    }

    /// 단일 연결에 보냅니다. 항상 로컬 전달입니다.
    pub fn send_to_connection(&self, conn_id: &str, message: ServerMessage) {
        self.deliver_local(Envelope::new(
            Audience::Connection(conn_id.to_string()),
            message,
        ));
    }

    /// 이 인스턴스의 연결에 envelope를 전달합니다.
    pub fn deliver_local(&self, envelope: Envelope) {
        if let Err(e) = self.tx.send(envelope) {
            // 연결이 하나도 없으면 발생
            debug!("Broadcast error (likely no receivers): {}", e);
        }
    }
}

/// room 이름 검증.
fn validate_room(room: &str) -> Result<(), WsError> {
    if room.trim().is_empty() {
        return Err(WsError::InvalidRoom("room 이름이 비어 있습니다".to_string()));
    }
    if room == TOP_AGGREGATE_ROOM {
        return Err(WsError::InvalidRoom(format!("{}는 예약된 이름입니다", room)));
    }
    if room.len() > MAX_ROOM_LEN {
        return Err(WsError::InvalidRoom(format!(
            "room 이름은 {}자 이하여야 합니다",
            MAX_ROOM_LEN
        )));
    }
    Ok(())
}
