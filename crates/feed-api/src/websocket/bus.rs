//! 인스턴스 간 브로드캐스트 버스.
//!
//! 버스가 설정되면 전체/room 대상 메시지는 버스로 발행되고, 각 인스턴스의
//! 리스너가 받아서 자기 로컬 연결에 전달합니다. 단일 연결 대상 메시지는
//! 버스를 거치지 않습니다.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{Envelope, WsError};
use super::rooms::RoomBroadcaster;
use feed_data::RedisCache;

/// 기본 pub/sub 채널 이름.
pub const BROADCAST_CHANNEL: &str = "feed:broadcast";

/// 구독이 끊겼을 때 재구독까지 대기 시간.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// 브로드캐스트 버스.
#[async_trait]
pub trait FanoutBus: Send + Sync {
    /// envelope를 모든 인스턴스에 발행합니다.
    async fn publish(&self, envelope: &Envelope) -> Result<(), WsError>;

    /// 발행된 envelope 스트림을 구독합니다.
    async fn subscribe(&self) -> Result<BoxStream<'static, Envelope>, WsError>;

    /// 버스 이름.
    fn name(&self) -> &str;
}

/// Redis PUBLISH/SUBSCRIBE 기반 버스.
pub struct RedisFanoutBus {
    redis: Arc<RedisCache>,
    channel: String,
}

impl RedisFanoutBus {
    /// 기본 채널(`feed:broadcast`)을 쓰는 버스를 생성합니다.
    pub fn new(redis: Arc<RedisCache>) -> Self {
        Self::with_channel(redis, BROADCAST_CHANNEL)
    }

    /// 채널을 지정해 버스를 생성합니다.
    pub fn with_channel(redis: Arc<RedisCache>, channel: impl Into<String>) -> Self {
        Self {
            redis,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl FanoutBus for RedisFanoutBus {
    async fn publish(&self, envelope: &Envelope) -> Result<(), WsError> {
        let payload = serde_json::to_string(envelope)?;
        let receivers = self
            .redis
            .publish(&self.channel, &payload)
            .await
            .map_err(|e| WsError::Bus(e.to_string()))?;
        debug!(channel = %self.channel, receivers, event = envelope.message.event(), "Published");
        Ok(())
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, Envelope>, WsError> {
        let payloads = self
            .redis
            .subscribe(&self.channel)
            .await
            .map_err(|e| WsError::Bus(e.to_string()))?;

        Ok(payloads
            .filter_map(|payload| async move {
                match serde_json::from_str::<Envelope>(&payload) {
                    Ok(envelope) => Some(envelope),
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed bus payload");
                        None
                    }
                }
            })
            .boxed())
    }

    fn name(&self) -> &str {
        "redis"
    }
}

/// 버스 리스너를 시작합니다.
///
/// 수신한 envelope를 로컬 연결에 전달하고, 구독이 끊기면 재구독합니다.
pub fn spawn_bus_listener(
    bus: Arc<dyn FanoutBus>,
    broadcaster: Arc<RoomBroadcaster>,
    shutdown_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(bus = bus.name(), "Bus listener started");

        'outer: loop {
            let mut stream = match bus.subscribe().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "Bus subscribe failed, retrying");
                    tokio::select! {
                        _ = shutdown_token.cancelled() => break,
                        _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => continue,
                    }
                }
            };

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_token.cancelled() => break 'outer,
                    next = stream.next() => match next {
                        Some(envelope) => broadcaster.deliver_local(envelope),
                        None => {
                            warn!("Bus subscription closed, resubscribing");
                            break;
                        }
                    },
                }
            }
        }

        info!("Bus listener stopped");
    })
}
