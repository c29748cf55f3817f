//! 실시간 시세 푸시를 위한 WebSocket 서버.
//!
//! # 이벤트
//!
//! - `top5_update` - 모든 연결에 상위 5개 자산
//! - `top_n_update` - 집계 구독자에게 상위 N개 자산
//! - `crypto_update` - 자산 room 멤버에게 최근 가격 히스토리
//!
//! # 메시지 형식
//!
//! ## 클라이언트 → 서버
//!
//! ```json
//! {"event": "join_room", "data": {"room": "bitcoin"}}
//! {"event": "leave_room", "data": {"room": "bitcoin"}}
//! {"event": "subscribe_top_aggregate"}
//! {"event": "unsubscribe_top_aggregate"}
//! ```
//!
//! ## 서버 → 클라이언트
//!
//! ```json
//! {"event": "top5_update", "data": {"records": [...]}}
//! {"event": "crypto_update", "data": {"room": "bitcoin", "points": [...]}}
//! {"event": "error", "data": {"code": "INVALID_ROOM", "message": "..."}}
//! ```

pub mod aggregator;
pub mod bus;
pub mod handler;
pub mod messages;
pub mod poller;
pub mod rooms;

pub use aggregator::{start_top_aggregator, TopAggregator};
pub use bus::{spawn_bus_listener, FanoutBus, RedisFanoutBus, BROADCAST_CHANNEL};
pub use handler::{websocket_handler, websocket_router, WsState};
pub use messages::{Audience, ClientMessage, Envelope, ServerMessage, WsError};
pub use poller::{PollSummary, RoomPoller};
pub use rooms::{RoomBroadcaster, SharedBroadcaster, TOP_AGGREGATE_ROOM, TOP_FIVE};
