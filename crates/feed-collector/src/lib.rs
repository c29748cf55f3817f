//! 시세 캐시 갱신 스케줄러.
//!
//! 이 crate는 API 서버와 함께 또는 독립적으로 실행되는 갱신 작업을 제공합니다:
//! - 시세 스냅샷 + 가격 히스토리 갱신 (기본 30초)
//! - 환율 테이블 갱신 (기본 10분)

pub mod error;
pub mod jobs;
pub mod scheduler;
pub mod stats;

pub use error::{CollectorError, Result};
pub use jobs::{ExchangeRateRefreshJob, PriceRefreshJob, RefreshJob};
pub use scheduler::RefreshScheduler;
pub use stats::RefreshStats;
