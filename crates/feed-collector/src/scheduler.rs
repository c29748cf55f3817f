//! 갱신 스케줄러.
//!
//! 시세 갱신과 환율 갱신을 서로 독립된 주기 작업으로 실행합니다. 여러
//! 인스턴스의 스케줄러가 동시에 실행되어도 캐시 내부의 lock이 주기당 하나의
//! 기록만 허용하므로 별도 조율은 필요 없습니다.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::jobs::{ExchangeRateRefreshJob, PriceRefreshJob, RefreshJob};
use crate::Result;
use feed_core::{PeriodicTask, RefreshConfig, UpstreamConfig};
use feed_data::{CoinGeckoProvider, ExchangeRateApiProvider, MarketDataCache};

/// 주기와 함께 등록된 갱신 작업.
struct ScheduledJob {
    job: Arc<dyn RefreshJob>,
    period: Duration,
}

/// 갱신 스케줄러.
#[derive(Default)]
pub struct RefreshScheduler {
    jobs: Vec<ScheduledJob>,
}

impl RefreshScheduler {
    /// 빈 스케줄러를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정값으로 CoinGecko 시세 작업과 환율 작업을 구성합니다.
    pub fn from_config(
        cache: Arc<MarketDataCache>,
        refresh: &RefreshConfig,
        upstream: &UpstreamConfig,
    ) -> Result<Self> {
        let markets = CoinGeckoProvider::new(&upstream.markets_base_url, upstream.timeout())?;
        let rates = ExchangeRateApiProvider::new(&upstream.exchange_rate_url, upstream.timeout())?;

        Ok(Self::new()
            .with_job(
                Arc::new(PriceRefreshJob::new(
                    Arc::new(markets),
                    Arc::clone(&cache),
                    refresh.quantity,
                )),
                refresh.price_interval(),
            )
            .with_job(
                Arc::new(ExchangeRateRefreshJob::new(Arc::new(rates), cache)),
                refresh.exchange_interval(),
            ))
    }

    /// 작업을 추가합니다.
    pub fn with_job(mut self, job: Arc<dyn RefreshJob>, period: Duration) -> Self {
        self.jobs.push(ScheduledJob { job, period });
        self
    }

    /// 이름이 일치하는 작업만 남깁니다.
    pub fn only(mut self, name: &str) -> Self {
        self.jobs.retain(|s| s.job.name() == name);
        self
    }

    /// 등록된 작업 이름 목록.
    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|s| s.job.name()).collect()
    }

    /// 모든 작업을 한 번씩 실행합니다.
    ///
    /// # Returns
    ///
    /// 성공한 작업 수
    pub async fn run_all_once(&self) -> usize {
        let mut succeeded = 0;
        for scheduled in &self.jobs {
            if run_job(scheduled.job.as_ref()).await {
                succeeded += 1;
            }
        }
        succeeded
    }

    /// 각 작업을 주기 작업으로 spawn합니다.
    pub fn start(&self, shutdown_token: CancellationToken) -> Vec<JoinHandle<()>> {
        self.jobs
            .iter()
            .map(|scheduled| {
                let job = Arc::clone(&scheduled.job);
                info!(
                    job = job.name(),
                    interval_secs = scheduled.period.as_secs(),
                    "갱신 작업 등록"
                );

                PeriodicTask::new(job.name(), scheduled.period, shutdown_token.clone()).spawn(
                    move || {
                        let job = Arc::clone(&job);
                        async move {
                            run_job(job.as_ref()).await;
                        }
                    },
                )
            })
            .collect()
    }
}

/// 작업을 한 번 실행하고 결과를 기록합니다.
async fn run_job(job: &dyn RefreshJob) -> bool {
    match job.run_once().await {
        Ok(stats) => {
            stats.log_summary(job.name());
            true
        }
        Err(e) if e.is_transient() => {
            warn!(job = job.name(), error = %e, "갱신 실패, 다음 주기에 재시도");
            false
        }
        Err(e) => {
            error!(job = job.name(), error = %e, "갱신 실패");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectorError, RefreshStats};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RefreshJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_once(&self) -> Result<RefreshStats> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CollectorError::DataSource("down".to_string()))
            } else {
                Ok(RefreshStats::new())
            }
        }
    }

    fn job(fail: bool) -> Arc<CountingJob> {
        Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_run_all_once_counts_successes() {
        let ok = job(false);
        let failing = job(true);
        let scheduler = RefreshScheduler::new()
            .with_job(ok.clone(), Duration::from_secs(30))
            .with_job(failing.clone(), Duration::from_secs(600));

        assert_eq!(scheduler.run_all_once().await, 1);
        assert_eq!(ok.runs.load(Ordering::SeqCst), 1);
        assert_eq!(failing.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_only_filters_by_name() {
        let scheduler = RefreshScheduler::new()
            .with_job(job(false), Duration::from_secs(30))
            .only("missing");
        assert!(scheduler.job_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_run_on_independent_periods() {
        let fast = job(false);
        let slow = job(true);
        let scheduler = RefreshScheduler::new()
            .with_job(fast.clone(), Duration::from_secs(30))
            .with_job(slow.clone(), Duration::from_secs(600));

        let token = CancellationToken::new();
        let handles = scheduler.start(token.clone());

        tokio::time::sleep(Duration::from_secs(95)).await;
        token.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        // t = 0, 30, 60, 90
        assert_eq!(fast.runs.load(Ordering::SeqCst), 4);
        // 600초 주기이므로 첫 실행만
        assert_eq!(slow.runs.load(Ordering::SeqCst), 1);
    }
}
