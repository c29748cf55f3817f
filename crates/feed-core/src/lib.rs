//! # Feed Core
//!
//! 암호화폐 시세 피드의 핵심 도메인 모델과 공용 인프라를 제공합니다.
//!
//! - 시세 스냅샷, 가격 히스토리, 환율 테이블
//! - 통화 변환
//! - 예약 메일 구독자
//! - 설정 로드
//! - 로깅 초기화
//! - 취소 가능한 주기 작업

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod task;

pub use self::config::*;
pub use domain::*;
pub use error::*;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use task::PeriodicTask;
