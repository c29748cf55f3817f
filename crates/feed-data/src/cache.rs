//! 시세 데이터 캐시.
//!
//! 현재 스냅샷, 크기가 제한된 가격 히스토리, 환율 테이블을 공유 저장소에
//! 보관합니다. 쓰기는 키별 lock 안에서 원자적으로 수행되고, lock을 얻지
//! 못하면 해당 주기의 쓰기는 건너뜁니다. 읽기는 lock 없이 마지막으로 완료된
//! 쓰기를 봅니다.
//!
//! # 저장 구조
//!
//! | 키 | 내용 |
//! |---|---|
//! | `crypto:data` | 스냅샷 (JSON 배열) |
//! | `crypto:last_updated` | 스냅샷 시각 (unix 초) |
//! | `crypto:history` | 리스트, 항목 하나가 갱신 한 번의 배치. 최신이 앞 |
//! | `currency:exchange` | 환율 테이블 (JSON 객체) |

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::lock::{lock_name, LockGuard, LockManager};
use crate::storage::CacheStore;
use feed_core::{CryptoCurrency, ExchangeRateTable, HistoryPoint, RedisSettings, RefreshConfig};

/// 캐시 키.
pub mod keys {
    /// 현재 스냅샷
    pub const SNAPSHOT: &str = "crypto:data";
    /// 스냅샷 시각
    pub const LAST_UPDATED: &str = "crypto:last_updated";
    /// 가격 히스토리 리스트
    pub const HISTORY: &str = "crypto:history";
    /// 환율 테이블
    pub const EXCHANGE_RATES: &str = "currency:exchange";
}

/// 쓰기 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// 기록됨
    Written,
    /// 다른 보유자가 lock을 갖고 있어 건너뜀
    Skipped,
}

impl WriteOutcome {
    /// 기록되었는지 확인합니다.
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written)
    }
}

/// 캐시 설정.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// 쓰기 lock TTL
    pub lock_ttl: Duration,
    /// 히스토리 최대 배치 수
    pub max_history: usize,
}

impl CacheSettings {
    /// 설정 파일 값으로부터 생성합니다.
    pub fn from_config(redis: &RedisSettings, refresh: &RefreshConfig) -> Self {
        Self {
            lock_ttl: Duration::from_secs(redis.lock_ttl_secs.max(1)),
            max_history: refresh.max_history_size(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from_config(&RedisSettings::default(), &RefreshConfig::default())
    }
}

/// 시세 데이터 캐시.
///
/// 프로세스 시작 시 한 번 생성하여 `Arc`로 공유합니다.
#[derive(Clone)]
pub struct MarketDataCache {
    store: Arc<dyn CacheStore>,
    locks: LockManager,
    settings: CacheSettings,
}

impl MarketDataCache {
    /// 새 캐시를 생성합니다.
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self {
            locks: LockManager::new(Arc::clone(&store)),
            store,
            settings,
        }
    }

    /// 히스토리 최대 배치 수.
    pub fn max_history(&self) -> usize {
        self.settings.max_history
    }

    /// 저장소 연결 상태를 확인합니다.
    pub async fn health_check(&self) -> Result<bool> {
        self.store.health_check().await
    }

    // =========================================================================
    // 쓰기 (lock 보호)
    // =========================================================================

    /// 스냅샷과 갱신 시각을 한 번에 교체합니다.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn save_snapshot(&self, records: &[CryptoCurrency]) -> Result<WriteOutcome> {
        let Some(guard) = self
            .locks
            .lock(&lock_name(keys::SNAPSHOT), self.settings.lock_ttl)
            .await?
        else {
            debug!("Snapshot write skipped: lock held elsewhere");
            return Ok(WriteOutcome::Skipped);
        };

        let payload = serde_json::to_string(records)?;
        let timestamp = Utc::now().timestamp().to_string();
        self.store
            .set_many(&[(keys::SNAPSHOT, payload), (keys::LAST_UPDATED, timestamp)])
            .await?;

        release_after_write(guard).await;
        Ok(WriteOutcome::Written)
    }

    /// 갱신 한 번 분량의 히스토리 배치를 앞에 추가하고 최대 크기로 자릅니다.
    #[instrument(skip(self, points), fields(count = points.len()))]
    pub async fn save_history_point(&self, points: &[HistoryPoint]) -> Result<WriteOutcome> {
        let Some(guard) = self
            .locks
            .lock(&lock_name(keys::HISTORY), self.settings.lock_ttl)
            .await?
        else {
            debug!("History write skipped: lock held elsewhere");
            return Ok(WriteOutcome::Skipped);
        };

        let payload = serde_json::to_string(points)?;
        self.store
            .push_front_capped(keys::HISTORY, &payload, self.settings.max_history)
            .await?;

        release_after_write(guard).await;
        Ok(WriteOutcome::Written)
    }

    /// 환율 테이블을 교체합니다.
    #[instrument(skip(self, table), fields(count = table.len()))]
    pub async fn save_exchange_rates(&self, table: &ExchangeRateTable) -> Result<WriteOutcome> {
        let Some(guard) = self
            .locks
            .lock(&lock_name(keys::EXCHANGE_RATES), self.settings.lock_ttl)
            .await?
        else {
            debug!("Exchange rate write skipped: lock held elsewhere");
            return Ok(WriteOutcome::Skipped);
        };

        let payload = serde_json::to_string(table)?;
        self.store
            .set_many(&[(keys::EXCHANGE_RATES, payload)])
            .await?;

        release_after_write(guard).await;
        Ok(WriteOutcome::Written)
    }

    // =========================================================================
    // 읽기 (lock 없음)
    // =========================================================================

    /// 현재 스냅샷. 없으면 빈 목록.
    pub async fn get_snapshot(&self) -> Result<Vec<CryptoCurrency>> {
        match self.store.get(keys::SNAPSHOT).await? {
            Some(raw) => Ok(decode_records(keys::SNAPSHOT, &raw)),
            None => Ok(Vec::new()),
        }
    }

    /// 스냅샷 갱신 시각 (unix 초).
    pub async fn get_last_updated(&self) -> Result<Option<i64>> {
        let raw = self.store.get(keys::LAST_UPDATED).await?;
        Ok(raw.and_then(|value| match value.trim().parse::<i64>() {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!(key = keys::LAST_UPDATED, error = %e, "Malformed timestamp");
                None
            }
        }))
    }

    /// 자산 하나의 최근 `limit`개 히스토리 포인트 (오래된 것부터).
    ///
    /// 리스트 전체를 한 번의 범위 읽기로 가져오므로 동시에 진행 중인 쓰기와
    /// 섞인 결과는 나오지 않습니다.
    pub async fn get_history(&self, asset_id: &str, limit: usize) -> Result<Vec<HistoryPoint>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let batches = self
            .store
            .list_range(keys::HISTORY, 0, self.settings.max_history.max(1) - 1)
            .await?;

        // 배치 내부 순서는 의미가 없으므로 최신 판정은 배치 단위
        let mut newest_first: Vec<HistoryPoint> = batches
            .iter()
            .flat_map(|raw| decode_records::<HistoryPoint>(keys::HISTORY, raw))
            .filter(|p| p.id == asset_id)
            .take(limit)
            .collect();

        newest_first.reverse();
        Ok(newest_first)
    }

    /// 히스토리에 저장된 배치 수.
    pub async fn history_len(&self) -> Result<usize> {
        self.store.list_len(keys::HISTORY).await
    }

    /// 환율 테이블. 없거나 손상되었으면 빈 테이블.
    pub async fn get_exchange_rates(&self) -> Result<ExchangeRateTable> {
        let Some(raw) = self.store.get(keys::EXCHANGE_RATES).await? else {
            return Ok(ExchangeRateTable::default());
        };

        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&raw) else {
            warn!(key = keys::EXCHANGE_RATES, "Malformed exchange rate table");
            return Ok(ExchangeRateTable::default());
        };

        let rates = map.into_iter().filter_map(|(code, value)| {
            match serde_json::from_value(value) {
                Ok(rate) => Some((code, rate)),
                Err(e) => {
                    warn!(currency = %code, error = %e, "Skipping malformed exchange rate");
                    None
                }
            }
        });
        Ok(ExchangeRateTable::new(rates))
    }
}

/// 쓰기가 끝난 뒤 lock을 해제합니다.
///
/// 데이터는 이미 기록되었으므로 해제 실패는 경고만 남기고, lock은 TTL로 만료됩니다.
async fn release_after_write(guard: LockGuard) {
    let name = guard.name().to_string();
    if let Err(e) = guard.release().await {
        warn!(lock = %name, error = %e, "Lock release failed; waiting for TTL expiry");
    }
}

/// JSON 배열을 항목별로 디코딩합니다. 실패한 항목은 경고 후 건너뜁니다.
fn decode_records<T: DeserializeOwned>(key: &str, raw: &str) -> Vec<T> {
    let items = match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(key, error = %e, "Skipping malformed entry");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key, index, error = %e, "Skipping malformed record");
                None
            }
        })
        .collect()
}
