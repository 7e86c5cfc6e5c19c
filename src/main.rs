//! Cross-chain Router - asset bridge payouts signed by an MPC network
//!
//! The router registers swaps seen on source chains, verifies them, pays out
//! on the destination chain with a threshold-signed transaction and follows
//! each payout until it is stable.

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

mod api;
mod chain;
mod config;
mod coordination;
mod error;
mod metrics;
mod mpc;
mod retry;
mod state;
mod tx;

use chain::{Bridge, ChainProvider, ConfigUpdateWatcher, EvmBridge, RouterRegistry, TokenTables};
use config::{DatabaseConfig, Settings, StoreBackend};
use coordination::{
    AcceptVerifier, CoordinationEngine, PayoutPlanner, Reloader, SwapPipeline, WorkerIntervals,
};
use metrics::MetricsServer;
use mpc::{HttpMpcClient, MpcCoordinator};
use state::{MemoryStore, PgSwapStore, SwapStateMachine, SwapStore};

#[tokio::main]
async fn main() -> Result<()> {
    let settings_path = Settings::config_path();
    let settings = Settings::load_from(&settings_path)?;

    init_logging(settings.router.log_json);

    info!("Starting Cross-chain Router v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded configuration for {} chains from {:?}",
        settings.enabled_chains().len(),
        settings_path
    );

    let store = open_store(&settings.database).await?;
    let machine = Arc::new(SwapStateMachine::new(store));

    let tokens = Arc::new(TokenTables::from_settings(&settings)?);

    // MPC signing is skipped entirely when payouts are signed with local keys
    let coordinator = if settings.router.sign_with_private_key {
        warn!("Signing payouts with private keys, MPC disabled");
        None
    } else {
        let rpc = Arc::new(HttpMpcClient::new(
            &settings.mpc.api_prefix,
            Duration::from_secs(settings.mpc.rpc_timeout_secs),
        ));
        Some(Arc::new(MpcCoordinator::from_config(
            &settings.mpc,
            settings.router.is_server,
            rpc,
        )?))
    };

    let nonce_recycle_ack = Duration::from_secs(settings.router.nonce_recycle_ack_secs);
    let mut bridges: Vec<Arc<dyn Bridge>> = Vec::new();
    let mut chain_configs = Vec::new();
    for (name, chain) in settings.enabled_chains() {
        let bridge = EvmBridge::new(
            chain.clone(),
            tokens.clone(),
            coordinator.clone(),
            nonce_recycle_ack,
        )?;
        info!("Bridge for chain {} ({}) initialized", name, chain.chain_id);
        bridges.push(Arc::new(bridge));
        chain_configs.push(chain.clone());
    }
    let registry = Arc::new(RouterRegistry::new(
        bridges,
        chain_configs,
        tokens,
        &settings.blacklist,
    ));

    if let Some(coordinator) = &coordinator {
        coordinator.init().await?;
        info!("MPC group {} is ready", coordinator.group().group_id);
    }

    let planner = Arc::new(PayoutPlanner::new(
        registry.clone(),
        &settings.router.identifier,
    ));
    let pipeline = Arc::new(SwapPipeline::new(
        registry.clone(),
        machine,
        planner.clone(),
        &settings.router,
    ));
    let verifier = Arc::new(AcceptVerifier::new(registry, planner));
    let is_server = coordinator
        .as_ref()
        .map_or(settings.router.is_server, |c| c.is_server());

    let engine = Arc::new(CoordinationEngine::new(
        pipeline.clone(),
        coordinator,
        verifier,
        build_reloader(&settings, &settings_path)?,
        is_server,
        WorkerIntervals::from_settings(&settings),
    ));
    info!("Coordination engine initialized");

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let pipeline = pipeline.clone();
        async move {
            if let Err(e) = api::run_server(config, pipeline).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start coordination engine
    let engine_handle = tokio::spawn({
        let engine = engine.clone();
        async move {
            if let Err(e) = engine.run().await {
                error!("Coordination engine error: {}", e);
            }
        }
    });

    info!("Cross-chain Router {} is running", settings.router.instance_id);
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    engine.stop().await;
    if tokio::time::timeout(Duration::from_secs(30), engine_handle)
        .await
        .is_err()
    {
        warn!("Coordination engine did not stop in time");
    }

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Cross-chain Router stopped");
    Ok(())
}

async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn SwapStore>> {
    match config.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory swap store, state is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PgSwapStore::connect(config).await?;
            info!("Database connection established");

            store.run_migrations().await?;
            info!("Database migrations complete");
            Ok(Arc::new(store))
        }
    }
}

fn build_reloader(settings: &Settings, settings_path: &Path) -> Result<Option<Reloader>> {
    let Some(reload) = &settings.reload else {
        return Ok(None);
    };
    let chain = settings
        .get_chain_by_id(reload.config_chain_id)
        .ok_or_else(|| anyhow!("reload chain {} is not configured", reload.config_chain_id))?;
    let watcher = ConfigUpdateWatcher::new(
        ChainProvider::new(chain.clone())?,
        &reload.config_contract,
    )?;
    info!(
        "Watching config contract {} on chain {}",
        reload.config_contract, reload.config_chain_id
    );
    Ok(Some(Reloader::new(
        watcher,
        settings_path.to_path_buf(),
        Duration::from_secs(reload.poll_interval_secs.max(1)),
        Duration::from_secs(reload.reload_cycle_secs),
    )))
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,crosschain_router=debug,sqlx=warn,hyper=warn")
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
