//! Standalone cache refresh daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use feed_collector::RefreshScheduler;
use feed_core::{init_logging, FeedConfig, LogConfig};
use feed_data::{CacheSettings, MarketDataCache, RedisCache, RedisConfig};

#[derive(Parser)]
#[command(name = "feed-collector")]
#[command(about = "Crypto market data cache refresher", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    /// 로그 레벨 (설정 파일 값보다 우선)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 데몬 모드: 시세와 환율을 각자의 주기로 계속 갱신
    Daemon,

    /// 한 번만 갱신하고 종료
    RefreshOnce {
        /// 갱신 대상
        #[arg(long, value_enum, default_value_t = Target::All)]
        target: Target,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Prices,
    Rates,
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 설정 로드
    let config = FeedConfig::load(&cli.config).context("설정 로드 실패")?;

    // 로깅 초기화
    let mut log_config = LogConfig::from_settings(&config.logging);
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    init_logging(log_config).map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    tracing::info!("Crypto Feed Collector 시작");

    // 공유 저장소 연결
    let redis = RedisCache::connect(&RedisConfig::from(&config.redis))
        .await
        .context("Redis 연결 실패")?;
    let cache = Arc::new(MarketDataCache::new(
        Arc::new(redis),
        CacheSettings::from_config(&config.redis, &config.refresh),
    ));
    if !cache.health_check().await.context("Redis 상태 확인 실패")? {
        anyhow::bail!("Redis PING 응답이 올바르지 않습니다");
    }
    tracing::info!("Redis 연결 성공");

    let scheduler = RefreshScheduler::from_config(
        Arc::clone(&cache),
        &config.refresh,
        &config.upstream,
    )?;

    match cli.command {
        Commands::RefreshOnce { target } => {
            let scheduler = match target {
                Target::All => scheduler,
                Target::Prices => scheduler.only("price_refresh"),
                Target::Rates => scheduler.only("exchange_rate_refresh"),
            };

            let succeeded = scheduler.run_all_once().await;
            let total = scheduler.job_names().len();
            tracing::info!(succeeded, total, "단발 갱신 완료");

            if succeeded < total {
                anyhow::bail!("{}개 중 {}개 갱신 실패", total, total - succeeded);
            }
        }
        Commands::Daemon => {
            tracing::info!(
                price_interval_secs = config.refresh.price_interval_secs,
                exchange_interval_secs = config.refresh.exchange_interval_secs,
                "=== 데몬 모드 시작 ==="
            );

            let shutdown_token = CancellationToken::new();
            let handles = scheduler.start(shutdown_token.clone());

            tokio::signal::ctrl_c()
                .await
                .context("종료 신호 대기 실패")?;
            tracing::info!("종료 신호 수신, 데몬 종료 중...");

            shutdown_token.cancel();
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "갱신 작업 종료 중 오류");
                }
            }
        }
    }

    tracing::info!("Crypto Feed Collector 종료");
    Ok(())
}
