//! 공유 키-값 저장소 추상화.
//!
//! 캐시와 lock 관리자는 이 trait만 사용합니다. 운영 환경에서는 Redis
//! ([`RedisCache`]), 테스트와 단일 프로세스 개발 환경에서는 메모리 구현
//! ([`MemoryStore`])을 씁니다.
//!
//! 모든 쓰기 메서드는 원자적이어야 합니다. 읽는 쪽은 이전 값 또는 새 값만
//! 관찰하고 중간 상태는 관찰하지 않습니다.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

pub use self::memory::MemoryStore;
pub use self::redis::{RedisCache, RedisConfig};

/// 공유 저장소 trait.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 문자열 값을 읽습니다.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 여러 키를 하나의 원자적 단위로 설정합니다 (만료 없음).
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<()>;

    /// 키가 없을 때만 만료 시간과 함께 설정합니다.
    ///
    /// # Returns
    ///
    /// 설정에 성공하면 `true`
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// 저장된 값이 `expected`와 같을 때만 키를 삭제합니다 (단일 원자 연산).
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    /// 리스트 앞에 값을 넣고 `max_len`개로 자릅니다 (단일 원자 연산).
    async fn push_front_capped(&self, key: &str, value: &str, max_len: usize) -> Result<()>;

    /// 리스트의 `[start, stop]` 구간을 읽습니다 (양 끝 포함, 0이 가장 최근).
    async fn list_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>>;

    /// 리스트 길이.
    async fn list_len(&self, key: &str) -> Result<usize>;

    /// 저장소 연결 상태를 확인합니다.
    async fn health_check(&self) -> Result<bool>;
}
