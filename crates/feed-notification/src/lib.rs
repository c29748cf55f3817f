//! # Feed Notification
//!
//! 예약 다이제스트 메일 서비스.
//!
//! 구성 요소:
//! - 구독 관리 (`SubscriptionService`, `SubscriberRegistry`)
//! - 발송 큐 (`DeliveryCollector` → `DeliveryWorker`)
//! - 외부 협력 서비스: 리포트 렌더러(HTTP), 메일 릴레이(HTTP)
//!
//! # 발송 흐름
//!
//! 1. collector가 주기마다 현재 UTC 분 버킷의 구독자를 찾아 큐에 넣음
//! 2. worker가 캐시의 상위 자산으로 모든 리포트를 렌더링
//! 3. 요약 본문과 함께 첨부 메일을 보내고 임시 파일 삭제

pub mod delivery;
pub mod mailer;
pub mod renderer;
pub mod subscription;
pub mod summary;
pub mod types;

pub use delivery::*;
pub use mailer::HttpMailer;
pub use renderer::HttpRenderer;
pub use subscription::*;
pub use summary::{DigestSummary, Mover};
pub use types::*;
