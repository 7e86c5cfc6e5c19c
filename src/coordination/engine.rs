//! Worker loops driving the swap pipeline

use super::accept::AcceptVerifier;
use super::pipeline::{PassStats, SwapPipeline};
use crate::chain::reload::ConfigUpdateWatcher;
use crate::config::Settings;
use crate::error::{RouterError, RouterResult};
use crate::metrics;
use crate::mpc::MpcCoordinator;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Intervals of the worker loops
#[derive(Debug, Clone, Copy)]
pub struct WorkerIntervals {
    pub verify: Duration,
    pub swap: Duration,
    pub stable: Duration,
    pub accept: Duration,
    pub health: Duration,
}

impl WorkerIntervals {
    pub fn from_settings(settings: &Settings) -> Self {
        let poll = Duration::from_millis(settings.router.poll_interval_ms.max(1));
        Self {
            verify: poll,
            swap: poll,
            stable: poll * 3,
            accept: Duration::from_secs(settings.mpc.accept_interval_secs.max(1)),
            health: Duration::from_secs(settings.router.health_check_interval_secs.max(1)),
        }
    }
}

/// Config contract watching plus the file the settings are reread from
pub struct Reloader {
    watcher: ConfigUpdateWatcher,
    settings_path: PathBuf,
    poll_interval: Duration,
    /// Unconditional reload period; zero disables it
    cycle: Duration,
}

impl Reloader {
    pub fn new(
        watcher: ConfigUpdateWatcher,
        settings_path: PathBuf,
        poll_interval: Duration,
        cycle: Duration,
    ) -> Self {
        Self {
            watcher,
            settings_path,
            poll_interval,
            cycle,
        }
    }
}

/// Runs the verify, swap, stable, accept, reload and health workers
pub struct CoordinationEngine {
    pipeline: Arc<SwapPipeline>,
    /// Present on MPC routers; oracle nodes use it to answer sign requests
    coordinator: Option<Arc<MpcCoordinator>>,
    verifier: Arc<AcceptVerifier>,
    reloader: Option<Reloader>,
    is_server: bool,
    intervals: WorkerIntervals,
    shutdown: Arc<RwLock<bool>>,
}

impl CoordinationEngine {
    pub fn new(
        pipeline: Arc<SwapPipeline>,
        coordinator: Option<Arc<MpcCoordinator>>,
        verifier: Arc<AcceptVerifier>,
        reloader: Option<Reloader>,
        is_server: bool,
        intervals: WorkerIntervals,
    ) -> Self {
        Self {
            pipeline,
            coordinator,
            verifier,
            reloader,
            is_server,
            intervals,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Run every worker until `stop` is called
    pub async fn run(&self) -> RouterResult<()> {
        info!(
            "Coordination engine started ({} node)",
            if self.is_server { "server" } else { "oracle" }
        );

        let verify = self.worker("verify", self.intervals.verify, || self.pipeline.verify_once());
        let stable = self.worker("stable", self.intervals.stable, || self.pipeline.stable_once());
        let swap = async {
            if self.is_server {
                self.worker("swap", self.intervals.swap, || self.pipeline.swap_once())
                    .await;
            }
        };
        let accept = async {
            if let (false, Some(coordinator)) = (self.is_server, &self.coordinator) {
                self.worker("accept", self.intervals.accept, || {
                    self.accept_once(coordinator)
                })
                .await;
            }
        };
        let reload = async {
            if let Some(reloader) = &self.reloader {
                self.reload_loop(reloader).await;
            }
        };
        let health = self.health_loop();

        tokio::join!(verify, stable, swap, accept, reload, health);

        info!("Coordination engine stopped");
        Ok(())
    }

    /// Stop the coordination engine
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("Coordination engine shutdown initiated");
    }

    async fn is_stopped(&self) -> bool {
        *self.shutdown.read().await
    }

    async fn worker<F, Fut>(&self, name: &str, period: Duration, pass: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RouterResult<PassStats>>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.is_stopped().await {
                break;
            }
            let started = Instant::now();
            match pass().await {
                Ok(stats) if stats.scanned > 0 => debug!(
                    "{} pass: scanned {}, processed {}, failed {} in {:?}",
                    name,
                    stats.scanned,
                    stats.processed,
                    stats.failed,
                    started.elapsed()
                ),
                Ok(_) => {}
                Err(e) => {
                    error!("{} pass failed: {}", name, e);
                    metrics::record_error(name, &e);
                }
            }
        }
        debug!("{} worker stopped", name);
    }

    async fn accept_once(&self, coordinator: &MpcCoordinator) -> RouterResult<PassStats> {
        let verifier = self.verifier.as_ref();
        let round = coordinator
            .accept_pending(|info| async move { verifier.judge(&info).await })
            .await?;
        Ok(PassStats {
            scanned: round.pending,
            processed: round.agreed,
            failed: round.disagreed,
        })
    }

    async fn reload_loop(&self, reloader: &Reloader) {
        let mut ticker = interval(reloader.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_reload = Instant::now();
        loop {
            ticker.tick().await;
            if self.is_stopped().await {
                break;
            }
            let due = !reloader.cycle.is_zero() && last_reload.elapsed() >= reloader.cycle;
            let updated = match reloader.watcher.poll().await {
                Ok(block) => block,
                Err(e) => {
                    warn!("Poll config contract failed: {}", e);
                    None
                }
            };
            if updated.is_none() && !due {
                continue;
            }
            match self.reload(reloader) {
                Ok(()) => {
                    last_reload = Instant::now();
                    info!("Reloaded router config (update block {:?})", updated);
                }
                Err(e) => error!("Reload router config failed: {}", e),
            }
        }
    }

    fn reload(&self, reloader: &Reloader) -> RouterResult<()> {
        let settings = Settings::load_from(&reloader.settings_path)
            .map_err(|e| RouterError::Config(format!("{:#}", e)))?;
        self.pipeline.registry().reload(&settings)
    }

    async fn health_loop(&self) {
        let mut ticker = interval(self.intervals.health);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.is_stopped().await {
                break;
            }
            self.health_check().await;
        }
    }

    /// Check every chain and the store, recording the outcome in metrics
    pub async fn health_check(&self) -> bool {
        let registry = self.pipeline.registry();
        let mut healthy = true;
        for chain_id in registry.chain_ids() {
            let bridge = match registry.get_bridge(chain_id) {
                Ok(bridge) => bridge,
                Err(_) => continue,
            };
            match bridge.get_latest_block_number().await {
                Ok(height) => {
                    metrics::record_chain_health(chain_id, true);
                    metrics::record_block_height(chain_id, height);
                }
                Err(e) => {
                    warn!("Chain {} health check failed: {}", chain_id, e);
                    metrics::record_chain_health(chain_id, false);
                    healthy = false;
                }
            }
        }

        let store_ok = match self.pipeline.machine().store().health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Store health check failed: {}", e);
                false
            }
        };
        metrics::record_health_check("store", store_ok);
        healthy && store_ok
    }
}
