//! WebSocket 연결 handler.
//!
//! Axum WebSocket 엔드포인트 및 메시지 처리.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerMessage};
use super::rooms::SharedBroadcaster;
use crate::metrics::{decrement_websocket_connections, increment_websocket_connections};

/// WebSocket 상태.
#[derive(Clone)]
pub struct WsState {
    /// room 브로드캐스터
    pub broadcaster: SharedBroadcaster,
}

impl WsState {
    /// 새로운 WebSocket 상태 생성.
    pub fn new(broadcaster: SharedBroadcaster) -> Self {
        Self { broadcaster }
    }
}

/// WebSocket 업그레이드 핸들러.
///
/// # 엔드포인트
///
/// `GET /ws`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(ws_state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ws_state))
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, state: WsState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "WebSocket connected");
    increment_websocket_connections();

    let mut broadcast_rx = state.broadcaster.register(&conn_id).await;
    state.broadcaster.on_connect(&conn_id).await;

    let (mut sender, mut receiver) = socket.split();

    // 클라이언트 메시지 수신 태스크
    let conn_id_clone = conn_id.clone();
    let state_clone = state.clone();
    let mut receive_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_client_frame(&conn_id_clone, msg, &state_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(conn_id = %conn_id_clone, "WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    // 브로드캐스트 메시지 전송 태스크
    let conn_id_clone = conn_id.clone();
    let state_clone = state.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(envelope) => {
                    if !state_clone
                        .broadcaster
                        .should_receive(&conn_id_clone, &envelope)
                        .await
                    {
                        continue;
                    }
                    match envelope.message.to_json() {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to encode {}: {}", envelope.message.event(), e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(conn_id = %conn_id_clone, "WebSocket lagged by {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // 하나의 태스크가 종료되면 다른 것도 종료
    tokio::select! {
        _ = &mut receive_task => {
            debug!(conn_id = %conn_id, "Receive task ended");
            send_task.abort();
        }
        _ = &mut send_task => {
            debug!(conn_id = %conn_id, "Send task ended");
            receive_task.abort();
        }
    }

    state.broadcaster.unregister(&conn_id).await;
    decrement_websocket_connections();

    info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// 수신 프레임 처리.
///
/// `true`면 연결 유지, `false`면 연결 종료
async fn handle_client_frame(conn_id: &str, msg: Message, state: &WsState) -> bool {
    match msg {
        Message::Text(text) => {
            match ClientMessage::from_json(&text) {
                Ok(client_msg) => process_client_message(conn_id, client_msg, state).await,
                Err(e) => {
                    warn!(conn_id, "Invalid message: {}", e);
                    state
                        .broadcaster
                        .send_to_connection(conn_id, ServerMessage::error(e.code(), e.to_string()));
                }
            }
            true
        }
        Message::Binary(_) => {
            warn!(conn_id, "Binary messages not supported");
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            debug!(conn_id, "Close message received");
            false
        }
    }
}

/// 파싱된 클라이언트 메시지 처리.
async fn process_client_message(conn_id: &str, msg: ClientMessage, state: &WsState) {
    let broadcaster = &state.broadcaster;

    let result = match msg {
        ClientMessage::JoinRoom { room } => broadcaster.join_room(conn_id, &room).await.map(|_| ()),
        ClientMessage::LeaveRoom { room } => {
            broadcaster.leave_room(conn_id, &room).await;
            Ok(())
        }
        ClientMessage::SubscribeTopAggregate => broadcaster.subscribe_top_aggregate(conn_id).await,
        ClientMessage::UnsubscribeTopAggregate => {
            broadcaster.unsubscribe_top_aggregate(conn_id).await;
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!(conn_id, "Client request rejected: {}", e);
        broadcaster.send_to_connection(conn_id, ServerMessage::error(e.code(), e.to_string()));
    }
}

/// WebSocket 라우터 생성.
pub fn websocket_router<S>(ws_state: WsState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(websocket_handler))
        .with_state(ws_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::rooms::tests::{drain_for, empty_cache};
    use crate::websocket::rooms::{RoomBroadcaster, TOP_AGGREGATE_ROOM};

    fn state() -> WsState {
        WsState::new(Arc::new(RoomBroadcaster::new(empty_cache(), 50, 64)))
    }

    #[tokio::test]
    async fn test_join_and_leave_frames() {
        let state = state();
        let mut rx = state.broadcaster.register("a").await;

        let join = Message::Text(r#"{"event":"join_room","data":{"room":"bitcoin"}}"#.into());
        assert!(handle_client_frame("a", join, &state).await);
        assert_eq!(state.broadcaster.refcount("bitcoin").await, Some(1));

        let leave = Message::Text(r#"{"event":"leave_room","data":{"room":"bitcoin"}}"#.into());
        assert!(handle_client_frame("a", leave, &state).await);
        assert_eq!(state.broadcaster.refcount("bitcoin").await, Some(0));

        let received = drain_for(&state.broadcaster, "a", &mut rx).await;
        assert!(matches!(received[0], ServerMessage::CryptoUpdate { .. }));
    }

    #[tokio::test]
    async fn test_invalid_frame_gets_error_and_keeps_connection() {
        let state = state();
        let mut rx = state.broadcaster.register("a").await;

        let frame = Message::Text("{not json".into());
        assert!(handle_client_frame("a", frame, &state).await);

        let received = drain_for(&state.broadcaster, "a", &mut rx).await;
        assert!(matches!(
            &received[0],
            ServerMessage::Error { code, .. } if code == "INVALID_MESSAGE"
        ));
    }

    #[tokio::test]
    async fn test_reserved_room_rejected_with_error() {
        let state = state();
        let mut rx = state.broadcaster.register("a").await;

        let frame = Message::Text(
            format!(r#"{{"event":"join_room","data":{{"room":"{}"}}}}"#, TOP_AGGREGATE_ROOM).into(),
        );
        assert!(handle_client_frame("a", frame, &state).await);
        assert_eq!(state.broadcaster.refcount(TOP_AGGREGATE_ROOM).await, None);

        let received = drain_for(&state.broadcaster, "a", &mut rx).await;
        assert!(matches!(
            &received[0],
            ServerMessage::Error { code, .. } if code == "INVALID_ROOM"
        ));
    }

    #[tokio::test]
    async fn test_close_frame_ends_connection() {
        let state = state();
        let _rx = state.broadcaster.register("a").await;
        assert!(!handle_client_frame("a", Message::Close(None), &state).await);
    }
}
