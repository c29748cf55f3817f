//! 예약 메일 구독 관리.
//!
//! 구독자는 정규화된 이메일을 키로 하는 프로세스 내 레지스트리에 보관됩니다.
//! 같은 이메일로 다시 구독하면 기존 예약을 유지합니다.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use validator::Validate;

use feed_core::{normalize_email, MinuteBucket, Subscriber};

/// 구독자 레지스트리.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<String, Subscriber>>,
}

impl SubscriberRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 구독자를 추가합니다. 이미 있으면 `false`를 반환하고 기존 값을 유지합니다.
    pub async fn add(&self, subscriber: Subscriber) -> bool {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.contains_key(&subscriber.email) {
            return false;
        }
        subscribers.insert(subscriber.email.clone(), subscriber);
        true
    }

    /// 구독자를 제거합니다. 없던 이메일이면 `false`.
    pub async fn remove(&self, email: &str) -> bool {
        self.subscribers
            .write()
            .await
            .remove(&normalize_email(email))
            .is_some()
    }

    /// 주어진 분 버킷에 발송할 구독자 목록 (이메일 순).
    pub async fn due(&self, bucket: &MinuteBucket) -> Vec<Subscriber> {
        let mut due: Vec<Subscriber> = self
            .subscribers
            .read()
            .await
            .values()
            .filter(|s| s.is_due(bucket))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.email.cmp(&b.email));
        due
    }

    /// 구독자 수.
    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// 비어 있는지 확인합니다.
    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }

    /// 전체 구독자 목록 (이메일 순).
    pub async fn list(&self) -> Vec<Subscriber> {
        let mut all: Vec<Subscriber> = self.subscribers.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.email.cmp(&b.email));
        all
    }
}

/// 구독 요청.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SubscribeRequest {
    /// 수신 이메일
    #[validate(email(message = "올바른 이메일 형식이 아닙니다"))]
    pub email: String,
    /// 발송 시 (UTC, 0-23)
    #[validate(range(min = 0, max = 23, message = "시는 0-23 사이여야 합니다"))]
    pub hour: i32,
    /// 발송 분 (0-59)
    #[validate(range(min = 0, max = 59, message = "분은 0-59 사이여야 합니다"))]
    pub minute: i32,
}

/// 구독 해지 요청.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UnsubscribeRequest {
    /// 해지할 이메일
    #[validate(email(message = "올바른 이메일 형식이 아닙니다"))]
    pub email: String,
}

/// 구독/해지 응답.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubscribeResponse {
    /// 성공 여부
    pub success: bool,
    /// 사용자에게 보여줄 메시지
    pub message: String,
}

impl SubscribeResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// validator 에러를 사용자 메시지 한 줄로 합칩니다.
fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{}: 유효하지 않은 값", field))
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

/// 구독 서비스.
#[derive(Clone)]
pub struct SubscriptionService {
    registry: Arc<SubscriberRegistry>,
}

impl SubscriptionService {
    /// 새 서비스를 생성합니다.
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// 공유 레지스트리.
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// 이메일 구독을 등록합니다.
    ///
    /// 검증 실패는 에러가 아니라 `success=false` 응답으로 돌려줍니다.
    pub async fn subscribe_email(&self, email: &str, hour: i32, minute: i32) -> SubscribeResponse {
        if email.trim().is_empty() {
            return SubscribeResponse::rejected("이메일을 입력해 주세요");
        }

        let request = SubscribeRequest {
            email: email.trim().to_string(),
            hour,
            minute,
        };
        if let Err(errors) = request.validate() {
            debug!(email = %request.email, "Subscription rejected by validation");
            return SubscribeResponse::rejected(validation_message(&errors));
        }

        // 검증을 통과했으므로 음수가 아님
        let subscriber = Subscriber::new(&request.email, hour as u32, minute as u32);
        let email = subscriber.email.clone();
        if self.registry.add(subscriber).await {
            info!(%email, hour, minute, "Subscriber added");
            SubscribeResponse::ok(format!(
                "{}로 매일 {:02}:{:02} (UTC)에 리포트를 보냅니다",
                email, hour, minute
            ))
        } else {
            debug!(%email, "Subscriber already registered");
            SubscribeResponse::ok(format!("{}는 이미 구독 중입니다", email))
        }
    }

    /// 이메일 구독을 해지합니다. 없는 이메일도 성공으로 처리합니다.
    pub async fn unsubscribe_email(&self, email: &str) -> SubscribeResponse {
        if email.trim().is_empty() {
            return SubscribeResponse::rejected("이메일을 입력해 주세요");
        }

        let request = UnsubscribeRequest {
            email: email.trim().to_string(),
        };
        if let Err(errors) = request.validate() {
            return SubscribeResponse::rejected(validation_message(&errors));
        }

        if self.registry.remove(&request.email).await {
            info!(email = %normalize_email(&request.email), "Subscriber removed");
        }
        SubscribeResponse::ok("구독이 해지되었습니다")
    }
}
