//! 취소 가능한 주기 작업.
//!
//! 시세 갱신, 룸 폴링, 메일 수집기 등 모든 백그라운드 루프가 이 타입으로
//! 실행됩니다. 첫 실행은 즉시 이루어지고 이후 고정 주기로 반복되며, 대기
//! 지점마다 취소 토큰을 확인합니다.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 이름이 있는 주기 작업.
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    name: String,
    period: Duration,
    shutdown_token: CancellationToken,
}

impl PeriodicTask {
    /// 새 주기 작업을 생성합니다. 주기가 0이면 1초로 보정합니다.
    pub fn new(name: impl Into<String>, period: Duration, shutdown_token: CancellationToken) -> Self {
        Self {
            name: name.into(),
            period: if period.is_zero() {
                Duration::from_secs(1)
            } else {
                period
            },
            shutdown_token,
        }
    }

    /// 작업 이름.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 실행 주기.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// 취소될 때까지 `tick`을 주기적으로 실행합니다.
    ///
    /// 실행 중인 tick은 끝까지 수행되고, 다음 대기 지점에서 종료됩니다.
    /// 한 tick이 주기보다 오래 걸리면 밀린 tick은 건너뜁니다.
    pub async fn run<F, Fut>(self, mut tick: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(task = %self.name, period_secs = self.period.as_secs_f64(), "주기 작업 시작");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => {
                    debug!(task = %self.name, "종료 시그널 수신");
                    break;
                }
                _ = ticker.tick() => {
                    tick().await;
                }
            }
        }

        info!(task = %self.name, "주기 작업 종료됨");
    }

    /// 런타임에 작업을 spawn합니다.
    pub fn spawn<F, Fut>(self, tick: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(tick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_period() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let handle = PeriodicTask::new("counter", Duration::from_secs(10), token.clone()).spawn(
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        token.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_never_ticks() {
        let token = CancellationToken::new();
        token.cancel();

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        PeriodicTask::new("never", Duration::from_secs(1), token)
            .run(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_period_is_clamped() {
        let task = PeriodicTask::new("zero", Duration::ZERO, CancellationToken::new());
        assert_eq!(task.period(), Duration::from_secs(1));
        assert_eq!(task.name(), "zero");
    }
}
