use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use telemetry_core::activity::{ActivityTracker, INACTIVITY_THRESHOLD};
use telemetry_core::cache::SampleCache;
use telemetry_core::event::DispatchQueues;
use telemetry_core::registry::SubscriptionRegistry;
use telemetry_server::bridges::analysis::{AnalysisBridge, StubAnalysisEngine};
use telemetry_server::bridges::chat::ChatBridge;
use telemetry_server::cdc::decoder::{self, Pipeline};
use telemetry_server::cdc::source::MysqlReplicationSource;
use telemetry_server::config::Config;
use telemetry_server::dispatch::DispatchPool;
use telemetry_server::session::registry::SessionTable;
use telemetry_server::state::AppState;
use telemetry_server::{build_router, db};
use ui_log::UiLogger;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(config.log_level.clone())).init();

    info!("connecting to database...");
    let pool = db::create_pool(&config.database_url).await;
    db::run_migrations(&pool).await;
    info!("migrations applied");

    let cache = Arc::new(SampleCache::new());
    let registry = Arc::new(SubscriptionRegistry::new());
    let activity = Arc::new(ActivityTracker::new());
    let queues = Arc::new(DispatchQueues::new(
        telemetry_core::event::DEFAULT_SHARD_COUNT,
        telemetry_core::event::DEFAULT_QUEUE_CAPACITY,
    ));
    let sessions = Arc::new(SessionTable::new(config.max_connections));

    let (log_tx, _rx) = broadcast::channel(1024);
    let activity_log = Arc::new(UiLogger::with_buffer(log_tx, |entry| entry, 500));

    let analysis = Arc::new(AnalysisBridge::new(config.analysis_pool_size, Arc::new(StubAnalysisEngine)));
    let chat = config
        .deepseek_api_key
        .clone()
        .map(|key| Arc::new(ChatBridge::new(reqwest::Client::new(), key)));

    let state = AppState {
        pool: pool.clone(),
        cache: cache.clone(),
        registry: registry.clone(),
        activity: activity.clone(),
        queues: queues.clone(),
        sessions: sessions.clone(),
        analysis,
        chat,
        sampling_rate: config.sampling_rate,
        activity_log: activity_log.clone(),
    };

    match MysqlReplicationSource::connect(config.replication.clone()) {
        Ok(source) => {
            let pipeline = Pipeline { cache, activity: activity.clone(), registry: registry.clone(), queues: queues.clone() };
            decoder::spawn(source, pipeline);
            info!("CDC decoder thread started");
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to connect replication source, running without live ingest");
        }
    }

    let dispatch_pool = DispatchPool::spawn(queues, state.cache.clone(), registry.clone(), sessions.clone());

    tokio::spawn({
        let activity = activity.clone();
        let activity_log = activity_log.clone();
        async move {
            let mut ticker = tokio::time::interval(INACTIVITY_THRESHOLD);
            loop {
                ticker.tick().await;
                let roster = activity.sweep(tokio::time::Instant::now(), INACTIVITY_THRESHOLD);
                activity_log.log(format!("active patients: {}", roster.len()));
            }
        }
    });

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.expect("failed to bind");
    info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await.expect("server error");
    dispatch_pool.shutdown();
    info!("server shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
