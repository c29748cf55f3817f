//! 메모리 기반 저장소.
//!
//! 단일 프로세스 개발 환경과 테스트용입니다. 만료 시각은
//! `tokio::time::Instant` 기준이므로 `start_paused` 테스트에서
//! `tokio::time::advance`로 TTL 경과를 재현할 수 있습니다.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::CacheStore;
use crate::error::{DataError, Result};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// 메모리 저장소.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 테스트용: 임의의 원시 문자열을 기록합니다.
    pub async fn put_raw(&self, key: &str, value: &str) {
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: None,
            },
        );
    }

    /// 테스트용: 리스트 앞에 원시 문자열을 넣습니다.
    pub async fn push_raw(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        if let Value::List(list) = &mut entry.value {
            list.push_front(value.to_string());
        }
    }
}

fn wrong_type(key: &str) -> DataError {
    DataError::CacheError(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
        key
    ))
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => match &entry.value {
                Value::Text(text) => Ok(Some(text.clone())),
                Value::List(_) => Err(wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn set_many(&self, items: &[(&str, String)]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for (key, value) in items {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value.clone()),
                    expires_at: None,
                },
            );
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let matches = matches!(
            entries.get(key),
            Some(Entry { value: Value::Text(stored), .. }) if stored == expected
        ) && entries.get(key).is_some_and(|entry| entry.is_live(now));

        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn push_front_capped(&self, key: &str, value: &str, max_len: usize) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });

        match &mut entry.value {
            Value::List(list) => {
                list.push_front(value.to_string());
                list.truncate(max_len);
                Ok(())
            }
            Value::Text(_) => Err(wrong_type(key)),
        }
    }

    async fn list_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>> {
        let entries = self.entries.lock().await;
        match entries.get(key).map(|entry| &entry.value) {
            Some(Value::List(list)) => Ok(list
                .iter()
                .skip(start)
                .take(stop.saturating_sub(start).saturating_add(1))
                .cloned()
                .collect()),
            Some(Value::Text(_)) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let entries = self.entries.lock().await;
        match entries.get(key).map(|entry| &entry.value) {
            Some(Value::List(list)) => Ok(list.len()),
            Some(Value::Text(_)) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
