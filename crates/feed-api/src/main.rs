//! Crypto Feed API 서버.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use feed_api::websocket::FanoutBus;
use feed_api::{
    create_api_router, metrics_layer, setup_metrics_recorder, spawn_bus_listener,
    start_top_aggregator, websocket_router, AppState, MarketService, RedisFanoutBus,
    ReportService, RoomBroadcaster, RoomPoller, WsState,
};
use feed_collector::RefreshScheduler;
use feed_core::{init_logging, FeedConfig, LogConfig, ServerConfig};
use feed_data::{CacheSettings, CacheStore, MarketDataCache, RedisCache, RedisConfig};
use feed_notification::{
    DeliveryCollector, DeliveryWorker, HttpMailer, HttpRenderer, SubscriberRegistry,
    SubscriptionService, DELIVERY_QUEUE_CAPACITY,
};

/// 브로드캐스트 채널 버퍼 크기.
const BROADCAST_CAPACITY: usize = 1024;

/// 설정 파일 경로 환경변수.
const CONFIG_PATH_ENV: &str = "FEED_CONFIG";

/// CORS 레이어 설정.
///
/// `allowed_origin`이 없으면 개발 모드로 간주하여 모든 origin을 허용합니다.
fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let allow_origin = match server.allowed_origin.as_deref().map(str::parse) {
        Some(Ok(origin)) => {
            info!(origin = ?origin, "CORS restricted to configured origin");
            AllowOrigin::exact(origin)
        }
        Some(Err(e)) => {
            warn!(error = %e, "Invalid allowed_origin, allowing any");
            AllowOrigin::any()
        }
        None => {
            warn!("allowed_origin not set, allowing any origin (development mode)");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .max_age(Duration::from_secs(3600))
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    ws_state: WsState,
    server: &ServerConfig,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    Router::new()
        .merge(metrics_router)
        .merge(create_api_router().with_state(state))
        .nest("/ws", websocket_router(ws_state))
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(server.request_timeout_secs),
        ))
        .layer(cors_layer(server))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/default.toml".to_string());
    let config = FeedConfig::load(&config_path).context("설정 로드 실패")?;

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    info!("Starting Crypto Feed API server...");

    let metrics_handle = setup_metrics_recorder().context("Prometheus 레코더 설치 실패")?;
    info!("Prometheus metrics recorder initialized");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            error!(
                host = %config.server.host,
                port = config.server.port,
                error = %e,
                "소켓 주소 설정이 유효하지 않습니다"
            );
            e
        })?;

    // 공유 저장소 연결 (실패 시 시작 중단)
    let redis = Arc::new(
        RedisCache::connect(&RedisConfig::from(&config.redis))
            .await
            .context("Redis 연결 실패")?,
    );
    let store: Arc<dyn CacheStore> = redis.clone();
    let cache = Arc::new(MarketDataCache::new(
        store,
        CacheSettings::from_config(&config.redis, &config.refresh),
    ));
    if !cache.health_check().await.context("Redis 상태 확인 실패")? {
        anyhow::bail!("Redis PING 응답이 올바르지 않습니다");
    }
    info!("Redis connected");

    let shutdown_token = CancellationToken::new();

    // room 브로드캐스터 (다중 인스턴스면 버스 경유)
    let mut broadcaster = RoomBroadcaster::new(
        Arc::clone(&cache),
        config.broadcast.history_limit,
        BROADCAST_CAPACITY,
    );
    let bus: Option<Arc<dyn FanoutBus>> = if config.broadcast.use_bus {
        let bus: Arc<dyn FanoutBus> = Arc::new(RedisFanoutBus::new(Arc::clone(&redis)));
        broadcaster = broadcaster.with_bus(Arc::clone(&bus));
        Some(bus)
    } else {
        None
    };
    let broadcaster = Arc::new(broadcaster);
    if let Some(bus) = bus {
        spawn_bus_listener(bus, Arc::clone(&broadcaster), shutdown_token.clone());
        info!("Multi-instance mode: Redis pub/sub bus enabled");
    }

    // 캐시 갱신 스케줄러
    let mut background = Vec::new();
    if config.refresh.enabled {
        let scheduler =
            RefreshScheduler::from_config(Arc::clone(&cache), &config.refresh, &config.upstream)?;
        background.extend(scheduler.start(shutdown_token.clone()));
    } else {
        info!("In-process refresh disabled, expecting an external collector");
    }

    // 실시간 푸시
    let market = MarketService::new(Arc::clone(&cache), config.broadcast.stream_interval());
    background.push(start_top_aggregator(
        market.clone(),
        Arc::clone(&broadcaster),
        config.broadcast.top_n,
        shutdown_token.clone(),
    ));
    background.push(
        RoomPoller::new(Arc::clone(&broadcaster))
            .start(config.broadcast.poll_interval(), shutdown_token.clone()),
    );

    // 렌더러/메일 협력자
    let collaborators = &config.collaborators;
    let renderer = Arc::new(
        HttpRenderer::new(&collaborators.renderer_url, collaborators.timeout())
            .context("렌더러 클라이언트 생성 실패")?,
    );

    // 예약 메일 발송
    let registry = Arc::new(SubscriberRegistry::new());
    if config.delivery.enabled {
        let mailer = Arc::new(
            HttpMailer::new(
                &collaborators.mailer_url,
                &collaborators.mail_from,
                collaborators.timeout(),
            )
            .context("메일 클라이언트 생성 실패")?,
        );
        let (tx, rx) = mpsc::channel(DELIVERY_QUEUE_CAPACITY);

        background.push(
            Arc::new(DeliveryCollector::new(Arc::clone(&registry), tx))
                .start(config.delivery.poll_interval(), shutdown_token.clone()),
        );
        background.push(
            DeliveryWorker::new(
                Arc::clone(&cache),
                renderer.clone(),
                mailer,
                &config.delivery.temp_dir,
                config.delivery.digest_quantity,
                collaborators.timeout(),
            )
            .spawn(rx, shutdown_token.clone()),
        );
        info!("Scheduled digest delivery enabled");
        if config.broadcast.use_bus {
            warn!(
                "Subscriber registry is local to this instance; \
                 enable delivery on exactly one instance and route subscription requests to it"
            );
        }
    }

    let state = Arc::new(AppState::new(
        market.clone(),
        ReportService::new(market, renderer, collaborators.timeout()),
        SubscriptionService::new(registry),
        Arc::clone(&broadcaster),
    ));
    info!(version = %state.version, "Application state initialized");

    let app = create_router(
        state,
        metrics_handle,
        WsState::new(broadcaster),
        &config.server,
    );

    info!(%addr, "API server listening");
    info!("Metrics available at http://{}/metrics", addr);
    info!("WebSocket available at ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
        .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    let cleanup = tokio::time::timeout(Duration::from_secs(10), async {
        for handle in background {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
    })
    .await;
    if cleanup.is_err() {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM을 받으면 종료 토큰을 취소합니다. 시그널 핸들러 설치에
/// 실패한 쪽은 기다리지 않습니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
