//! 이름 기반 분산 lock.
//!
//! 여러 인스턴스의 갱신 작업이 같은 캐시 키를 동시에 변경하지 않도록
//! 보장합니다. 소유권은 획득 시 발급된 토큰의 일치 여부로만 증명되며,
//! 해제는 저장소의 원자적 compare-and-delete 한 번으로 수행됩니다.
//!
//! # 사용 예
//!
//! ```ignore
//! let Some(guard) = locks.lock("crypto:data:lock", ttl).await? else {
//!     return Ok(WriteOutcome::Skipped);
//! };
//! store.set_many(&entries).await?;
//! guard.release().await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::storage::CacheStore;

/// 데이터 키에 대응하는 lock 이름.
pub fn lock_name(key: &str) -> String {
    format!("{}:lock", key)
}

/// lock 소유 증명 토큰 (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// 토큰 문자열.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 분산 lock 관리자.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn CacheStore>,
}

impl LockManager {
    /// 공유 저장소 위에 lock 관리자를 생성합니다.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// lock 획득을 시도합니다.
    ///
    /// 만료되지 않은 같은 이름의 lock이 있으면 `None`을 반환합니다.
    /// 성공할 때마다 새 토큰이 발급됩니다.
    pub async fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let token = LockToken::generate();
        let acquired = self.store.set_if_absent(name, token.as_str(), ttl).await?;

        if acquired {
            debug!(lock = name, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
            Ok(Some(token))
        } else {
            debug!(lock = name, "Lock held elsewhere");
            Ok(None)
        }
    }

    /// 토큰이 일치할 때만 lock을 해제합니다.
    ///
    /// 불일치는 오류가 아니라 경고입니다. 이전 보유자의 TTL이 이미 만료되어
    /// 다른 보유자가 lock을 가져간 상황이며, 그 lock은 건드리지 않습니다.
    pub async fn release(&self, name: &str, token: &LockToken) -> Result<bool> {
        let released = self.store.delete_if_equals(name, token.as_str()).await?;

        if released {
            debug!(lock = name, "Lock released");
        } else {
            warn!(
                lock = name,
                token = %token,
                "Lock release skipped: token mismatch or lock already expired"
            );
        }
        Ok(released)
    }

    /// 범위 기반 lock을 획득합니다.
    ///
    /// 반환된 guard는 `release().await`로 명시적으로 해제하는 것이
    /// 기본이며, 그 외 경로(조기 반환, `?`, 취소)로 drop되면 런타임에
    /// 해제 작업을 spawn합니다.
    pub async fn lock(&self, name: &str, ttl: Duration) -> Result<Option<LockGuard>> {
        Ok(self.acquire(name, ttl).await?.map(|token| LockGuard {
            manager: self.clone(),
            name: name.to_string(),
            token: Some(token),
        }))
    }
}

/// 획득한 lock의 범위 guard.
pub struct LockGuard {
    manager: LockManager,
    name: String,
    token: Option<LockToken>,
}

impl LockGuard {
    /// lock 이름.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 소유 토큰.
    pub fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    /// lock을 해제합니다.
    pub async fn release(mut self) -> Result<bool> {
        match self.token.take() {
            Some(token) => self.manager.release(&self.name, &token).await,
            None => Ok(false),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                let manager = self.manager.clone();
                let name = std::mem::take(&mut self.name);
                handle.spawn(async move {
                    if let Err(e) = manager.release(&name, &token).await {
                        warn!(lock = %name, error = %e, "Deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                warn!(lock = %self.name, "No runtime to release lock; waiting for TTL expiry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn manager() -> LockManager {
        LockManager::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_lock_name() {
        assert_eq!(lock_name("crypto:data"), "crypto:data:lock");
    }

    #[tokio::test]
    async fn test_token_mismatch_keeps_lock() {
        let locks = manager();
        let ttl = Duration::from_secs(30);

        let t1 = locks.acquire("x", ttl).await.unwrap().unwrap();
        assert!(locks.acquire("x", ttl).await.unwrap().is_none());

        let t2 = LockToken("someone-else".to_string());
        assert!(!locks.release("x", &t2).await.unwrap());
        assert!(locks.acquire("x", ttl).await.unwrap().is_none());

        assert!(locks.release("x", &t1).await.unwrap());
        assert!(locks.acquire("x", ttl).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_unblocks_new_holder() {
        let locks = manager();
        let ttl = Duration::from_secs(30);

        let a = locks.acquire("x", ttl).await.unwrap().unwrap();
        assert!(locks.acquire("x", ttl).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(31)).await;

        let b = locks.acquire("x", ttl).await.unwrap().unwrap();
        assert_ne!(a, b);

        // 만료된 보유자의 해제는 새 보유자의 lock을 지우지 않는다
        assert!(!locks.release("x", &a).await.unwrap());
        assert!(locks.acquire("x", ttl).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_guard_explicit_release() {
        let locks = manager();
        let ttl = Duration::from_secs(30);

        let guard = locks.lock("x", ttl).await.unwrap().unwrap();
        assert_eq!(guard.name(), "x");
        assert!(locks.lock("x", ttl).await.unwrap().is_none());

        assert!(guard.release().await.unwrap());
        assert!(locks.lock("x", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_guard_drop_releases() {
        let locks = manager();
        let ttl = Duration::from_secs(30);

        {
            let _guard = locks.lock("x", ttl).await.unwrap().unwrap();
        }
        // drop에서 spawn된 해제 작업이 실행되도록 양보
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(locks.acquire("x", ttl).await.unwrap().is_some());
    }
}
