//! WebSocket 메시지 타입.
//!
//! 모든 프레임은 `{"event": ..., "data": ...}` 형태의 JSON입니다.

use serde::{Deserialize, Serialize};

use feed_core::{CryptoCurrency, HistoryPoint};

/// WebSocket 에러.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("잘못된 메시지 형식: {0}")]
    InvalidMessage(String),
    #[error("잘못된 room 이름: {0}")]
    InvalidRoom(String),
    #[error("등록되지 않은 연결: {0}")]
    UnknownConnection(String),
    #[error("pub/sub 버스 오류: {0}")]
    Bus(String),
    #[error("직렬화 실패: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl WsError {
    /// 클라이언트에 보낼 에러 코드.
    pub fn code(&self) -> &'static str {
        match self {
            WsError::InvalidMessage(_) => "INVALID_MESSAGE",
            WsError::InvalidRoom(_) => "INVALID_ROOM",
            WsError::UnknownConnection(_) => "UNKNOWN_CONNECTION",
            WsError::Bus(_) => "BUS_ERROR",
            WsError::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }
}

// ==================== 클라이언트 → 서버 메시지 ====================

/// 클라이언트에서 서버로 보내는 메시지.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 자산 room 입장
    JoinRoom { room: String },
    /// 자산 room 퇴장
    LeaveRoom { room: String },
    /// 상위 N 집계 구독
    SubscribeTopAggregate,
    /// 상위 N 집계 구독 해제
    UnsubscribeTopAggregate,
}

impl ClientMessage {
    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> Result<Self, WsError> {
        serde_json::from_str(json).map_err(|e| WsError::InvalidMessage(e.to_string()))
    }
}

// ==================== 서버 → 클라이언트 메시지 ====================

/// 서버에서 클라이언트로 보내는 메시지.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 자산 room의 가격 히스토리 (오래된 순)
    CryptoUpdate {
        room: String,
        points: Vec<HistoryPoint>,
    },
    /// 상위 5개 자산 (전체 연결)
    Top5Update { records: Vec<CryptoCurrency> },
    /// 상위 N개 자산 (집계 구독자)
    TopNUpdate { records: Vec<CryptoCurrency> },
    /// 에러
    Error { code: String, message: String },
}

impl ServerMessage {
    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(WsError::from)
    }

    /// 에러 메시지 생성 헬퍼.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 이벤트 이름.
    pub fn event(&self) -> &'static str {
        match self {
            ServerMessage::CryptoUpdate { .. } => "crypto_update",
            ServerMessage::Top5Update { .. } => "top5_update",
            ServerMessage::TopNUpdate { .. } => "top_n_update",
            ServerMessage::Error { .. } => "error",
        }
    }
}

// ==================== 전달 대상 ====================

/// 메시지 수신 대상.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "target", rename_all = "snake_case")]
pub enum Audience {
    /// 모든 연결
    All,
    /// 특정 room 멤버
    Room(String),
    /// 단일 연결 (이 인스턴스 로컬 전용)
    Connection(String),
}

/// 수신 대상이 붙은 메시지. pub/sub 버스의 payload이기도 합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// 수신 대상
    pub audience: Audience,
    /// 메시지
    pub message: ServerMessage,
}

impl Envelope {
    /// 새 envelope를 생성합니다.
    pub fn new(audience: Audience, message: ServerMessage) -> Self {
        Self { audience, message }
    }
}
