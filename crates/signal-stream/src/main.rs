//! 시그널 스트림 서버.
//!
//! 설정을 읽고 저장소, 배포 엔진, 모의 피드, 알림 소비자를 구성한 뒤
//! axum 서버를 시작합니다. Ctrl+C 또는 SIGTERM을 받으면 순서대로 종료합니다.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use signal_core::{init_logging, AppConfig, LogConfig};
use signal_data::MemoryStore;
use signal_feed::{FeedScheduler, MockMarketProducer};
use signal_notification::{
    LogSender, NotificationConsumer, NotificationManager, NotificationPolicy, WebhookSender,
};
use signal_stream::metrics::setup_metrics_recorder;
use signal_stream::{create_router, SharedEngine, StreamEngine};

#[derive(Parser, Debug)]
#[command(name = "signal-stream", version, about = "Real-time signal and alert fan-out server")]
struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, env = "SIGNAL_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    /// 로그 레벨 (설정 파일보다 우선)
    #[arg(long)]
    log_level: Option<String>,

    /// 모의 시세 피드 비활성화
    #[arg(long)]
    no_feed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.no_feed {
        config.feed.enabled = false;
    }

    init_logging(LogConfig::from_settings(&config.logging))?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting signal stream server");

    let metrics = match setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
            None
        }
    };

    let store = MemoryStore::new(&config.storage);
    let engine = StreamEngine::new(config.stream.clone(), Arc::new(store.clone())).shared();
    let background = engine.start();
    let (ingest_tx, ingest_task) = engine.spawn_ingest();

    let cancel = CancellationToken::new();

    let feed_task = if config.feed.enabled {
        let producer = MockMarketProducer::new(&config.feed);
        let scheduler = FeedScheduler::new(producer, store.clone(), ingest_tx.clone(), config.feed.tick_interval());
        Some(tokio::spawn(scheduler.run(cancel.child_token())))
    } else {
        info!("Mock feed disabled");
        None
    };
    drop(ingest_tx);

    let notification_task = if config.notifications.enabled {
        let policy = NotificationPolicy::from_config(&config.notifications)?;
        let mut manager = NotificationManager::new();
        manager.add_sender(LogSender);
        if !config.notifications.webhook_url.is_empty() {
            manager.add_sender(WebhookSender::new(config.notifications.webhook_url.clone())?);
        }
        let consumer = NotificationConsumer::new(policy, manager);
        Some(tokio::spawn(consumer.run(engine.subscribe_events(), cancel.child_token())))
    } else {
        None
    };

    let app = create_router(engine.clone(), &config.server.ws_path, metrics);
    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, ws_path = %config.server.ws_path, "Signal stream server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(engine.clone(), cancel.clone()))
        .await?;

    cancel.cancel();
    if let Some(task) = feed_task {
        if let Err(e) = task.await {
            error!(error = %e, "Feed task failed");
        }
    }
    if let Some(task) = notification_task {
        if let Err(e) = task.await {
            error!(error = %e, "Notification task failed");
        }
    }
    match ingest_task.await {
        Ok(published) => info!(published, "Ingest loop finished"),
        Err(e) => error!(error = %e, "Ingest task failed"),
    }
    for task in background {
        let _ = task.await;
    }

    info!("Signal stream server stopped");
    Ok(())
}

/// 종료 시그널 대기 후 피드를 멈추고 엔진을 종료합니다.
async fn shutdown_signal(engine: SharedEngine, cancel: CancellationToken) {
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

    // 피드를 먼저 멈춘 뒤 연결을 닫음
    cancel.cancel();
    let remaining = engine.shutdown().await;
    if remaining > 0 {
        warn!(remaining, "Some connections were still registered at shutdown");
    }
}
