//! Service entrypoint (§6 External Interfaces).
//!
//! Grounded on `interchain-indexer-server::server::run`'s shape (connect DB,
//! load config files, spawn indexer tasks, launch HTTP) but the final HTTP
//! launch is hand-rolled with a bare `actix_web::HttpServer` instead of
//! `blockscout_service_launcher::launcher::launch()` — that combinator's
//! signature requires a `tonic::transport::server::Router` argument even
//! when gRPC is disabled, and this service introduces no gRPC/tonic/prost
//! surface (§6 port note). `ConfigSettings` and `tracing::init_logs` are
//! still reused from the launcher crate for the ambient config/logging
//! stack; see DESIGN.md.

use std::{collections::HashMap, sync::Arc};

use actix_web::{App, HttpServer, middleware::Condition, web};
use actix_web_prom::PrometheusMetricsBuilder;
use anyhow::Context;
use blockscout_service_launcher::launcher::{HttpRouter, configure_router};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tokio_util::sync::CancellationToken;

use crate_indexer_logic::{
    control_plane::{ControlPlane, InMemoryModeRegistry},
    gateway::{ChainGateway, GatewayConfig},
    ingestion_loop::{self, LoopConfig},
    jobs::{MilestoneJobHandler, NoopMilestoneSideEffects, ReconciliationJobHandler},
    queue::{self, QUEUE_MILESTONE, QUEUE_RECONCILE, WorkerConfig},
    reconciliation::LoggingNotificationSink,
    registry::IngestionRegistry,
    replay::ReplayEngine,
    rpc_pool::{self, PoolConfig, RpcEndpointManager},
};
use migration::Migrator;

use crate::{decoder::TopicLogDecoder, routes, settings::Settings};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub registry: Arc<IngestionRegistry>,
    pub rpc_pool: Arc<RpcEndpointManager>,
    pub control_plane: Arc<ControlPlane<DatabaseConnection>>,
}

impl HttpRouter for AppState {
    fn register_routes(&self, service_config: &mut web::ServiceConfig) {
        service_config.app_data(web::Data::new(self.clone()));
        routes::configure(service_config);
    }
}

pub async fn run(settings: Settings) -> Result<(), anyhow::Error> {
    blockscout_service_launcher::tracing::init_logs(
        Settings::SERVICE_NAME_DISPLAY,
        &settings.tracing,
        &settings.jaeger,
    )?;

    if settings.database.url.is_empty() {
        anyhow::bail!("DATABASE_URL is required");
    }

    let db = Database::connect(&settings.database.url)
        .await
        .context("failed to connect to database")?;
    if settings.database.run_migrations {
        Migrator::up(&db, None).await?;
    }
    let db = Arc::new(db);

    let endpoints = rpc_pool::parse_rpc_endpoints_json(&settings.rpc.endpoints_json)
        .context("invalid INDEXER_EVENT_RPCS")?;
    if endpoints.values().any(|v| v.is_empty()) {
        anyhow::bail!("every configured chain must list at least one RPC endpoint");
    }
    let rpc_pool = Arc::new(RpcEndpointManager::new(
        endpoints,
        PoolConfig {
            failure_threshold: settings.rpc.failure_threshold,
            cooldown: std::time::Duration::from_millis(settings.rpc.cooldown_ms),
        },
    ));

    let topics = crate::decoder::parse_topic_map(&settings.event_topics_json)
        .context("invalid INDEXER_EVENT_TOPICS")?;
    let decoder = Arc::new(TopicLogDecoder::new(topics));

    let gateway = Arc::new(ChainGateway::new(
        rpc_pool.clone(),
        decoder,
        GatewayConfig {
            max_batch_size: settings.ingestion.max_batch,
            ..Default::default()
        },
    ));

    let registry = Arc::new(
        IngestionRegistry::load(&settings.streams_config).context("failed to load streams config")?,
    );

    let replay_runner = Arc::new(ReplayEngine::new(db.clone(), gateway.clone(), registry.clone()));
    let mode_registry = Arc::new(InMemoryModeRegistry::new());
    let control_plane = Arc::new(ControlPlane::new(db.clone(), mode_registry.clone(), replay_runner));

    let cancellation = CancellationToken::new();

    let _ingestion_handles = ingestion_loop::spawn_configured_streams(
        db.clone(),
        gateway.clone(),
        registry.clone(),
        LoopConfig {
            poll_interval: std::time::Duration::from_millis(settings.ingestion.poll_interval_ms),
            max_batch_size: settings.ingestion.max_batch,
            stream_failure_threshold: settings.ingestion.stream_failure_threshold,
            ..Default::default()
        },
        cancellation.child_token(),
    );

    let milestone_handler = Arc::new(MilestoneJobHandler::new(
        db.clone(),
        mode_registry,
        Arc::new(NoopMilestoneSideEffects),
    ));
    let _milestone_workers = queue::register_worker(
        db.clone(),
        QUEUE_MILESTONE.to_string(),
        milestone_handler,
        WorkerConfig::default(),
        cancellation.child_token(),
    );

    let reconciliation_handler = Arc::new(ReconciliationJobHandler::new(
        db.clone(),
        Arc::new(LoggingNotificationSink),
    ));
    let _reconciliation_workers = queue::register_worker(
        db.clone(),
        QUEUE_RECONCILE.to_string(),
        reconciliation_handler,
        WorkerConfig::default(),
        cancellation.child_token(),
    );

    let _rpc_snapshot_flush = {
        let db = db.clone();
        let rpc_pool = rpc_pool.clone();
        let interval = std::time::Duration::from_millis(settings.ingestion.registry_refresh_ms);
        let token = cancellation.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(err) = rpc_pool.persist_snapshot(db.as_ref()).await {
                    tracing::warn!(%err, "failed to persist rpc endpoint snapshot");
                }
            }
        })
    };

    let state = AppState {
        db,
        registry,
        rpc_pool,
        control_plane,
    };

    let mut futures = Vec::new();

    if settings.server.http.enabled {
        let http_server = http_serve(state, &settings.server.http, settings.metrics.enabled)?;
        futures.push(tokio::spawn(async move { http_server.await.map_err(anyhow::Error::from) }));
    }

    if settings.metrics.enabled {
        let metrics_addr = settings.metrics.addr;
        let metrics_middleware = PrometheusMetricsBuilder::new(Settings::SERVICE_NAME_DISPLAY)
            .registry(prometheus::default_registry().clone())
            .endpoint(&settings.metrics.route)
            .const_labels(HashMap::from([(
                "service_name".to_string(),
                Settings::SERVICE_NAME_DISPLAY.to_string(),
            )]))
            .build()
            .expect("prometheus metrics middleware misconfigured");

        tracing::info!(addr = %metrics_addr, "starting metrics server");
        let metrics_server = HttpServer::new(move || App::new().wrap(metrics_middleware.clone()))
            .bind(metrics_addr)
            .with_context(|| format!("failed to bind metrics server to {metrics_addr}"))?
            .run();
        futures.push(tokio::spawn(async move { metrics_server.await.map_err(anyhow::Error::from) }));
    }

    let (result, _, others) = futures::future::select_all(futures).await;
    for other in others {
        other.abort();
    }
    cancellation.cancel();
    result?
}

fn http_serve(
    state: AppState,
    settings: &blockscout_service_launcher::launcher::HttpServerSettings,
    metrics_enabled: bool,
) -> Result<actix_web::dev::Server, anyhow::Error> {
    tracing::info!(addr = %settings.addr, "starting http server");
    let json_cfg = web::JsonConfig::default().limit(settings.max_body_size);
    let cors_settings = settings.cors.clone();
    let cors_enabled = cors_settings.enabled;
    let base_path = settings.base_path.clone().map(String::from);

    let addr = settings.addr;
    if metrics_enabled {
        let http_middleware = PrometheusMetricsBuilder::new(Settings::SERVICE_NAME_DISPLAY)
            .registry(prometheus::default_registry().clone())
            .build()
            .expect("prometheus metrics middleware misconfigured");
        let server = HttpServer::new(move || {
            let cors = cors_settings.clone().build();
            App::new()
                .wrap(http_middleware.clone())
                .wrap(Condition::new(cors_enabled, cors))
                .app_data(json_cfg.clone())
                .configure(configure_router(&state, base_path.clone()))
        })
        .bind(addr)
        .with_context(|| format!("failed to bind http server to {addr}"))?
        .run();
        Ok(server)
    } else {
        let server = HttpServer::new(move || {
            let cors = cors_settings.clone().build();
            App::new()
                .wrap(Condition::new(cors_enabled, cors))
                .app_data(json_cfg.clone())
                .configure(configure_router(&state, base_path.clone()))
        })
        .bind(addr)
        .with_context(|| format!("failed to bind http server to {addr}"))?
        .run();
        Ok(server)
    }
}

impl Settings {
    /// The launcher's `tracing::init_logs` wants a human-readable service
    /// name, distinct from `ConfigSettings::SERVICE_NAME`'s env-var prefix.
    pub const SERVICE_NAME_DISPLAY: &'static str = "contest-indexer";
}

use blockscout_service_launcher::launcher::ConfigSettings;

/// Queue names the health/status routes report on (§4.12).
pub const QUEUE_NAMES: [&str; 2] = [QUEUE_MILESTONE, QUEUE_RECONCILE];
