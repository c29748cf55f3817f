//! 시세 데이터 저장 및 수집.
//!
//! 이 crate는 다음을 제공합니다:
//! - 공유 저장소 추상화 (Redis, 메모리)
//! - 토큰 기반 분산 lock
//! - 스냅샷/히스토리/환율 캐시
//! - 상류 시세 및 환율 Provider

pub mod cache;
pub mod error;
pub mod lock;
pub mod provider;
pub mod storage;

pub use cache::{keys, CacheSettings, MarketDataCache, WriteOutcome};
pub use error::{DataError, Result};
pub use lock::{lock_name, LockGuard, LockManager, LockToken};
pub use provider::{
    CoinGeckoProvider, ExchangeRateApiProvider, ExchangeRateProvider, MarketDataProvider,
};
pub use storage::{CacheStore, MemoryStore, RedisCache, RedisConfig};
