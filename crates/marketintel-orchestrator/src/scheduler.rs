//! Drives `Orchestrator::run` on a fixed interval.
//!
//! Grounded on the teacher's `CronScheduler` (`tokio::select!` racing an
//! interval against a broadcast shutdown channel) generalized from many
//! named cron entries down to this crate's one recurring pass, and on
//! `ComplianceScheduler::execute_task`'s wall-clock timing around a unit
//! of work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use marketintel_core::config::SchedulerConfig;
use marketintel_core::domain::RunHistory;
use marketintel_core::Result;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::pipeline::Orchestrator;

/// Interval-driven runner around a single [`Orchestrator`]. Single-flight:
/// a tick that lands while the previous pass is still running is skipped,
/// not queued.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    config: SchedulerConfig,
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            orchestrator,
            config,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A sender that, when sent on, requests graceful shutdown. Cloning it
    /// out lets a signal handler in the binary trigger shutdown without
    /// holding a reference to the scheduler itself.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Whether a pass is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs exactly one pass synchronously and returns its outcome. Used by
    /// the CLI's `--once` mode; the caller decides the process exit code
    /// from `RunHistory.status`.
    pub async fn run_once(&self) -> Result<RunHistory> {
        self.running.store(true, Ordering::Release);
        let result = self.orchestrator.run().await;
        self.running.store(false, Ordering::Release);
        result
    }

    /// Runs the interval loop until a shutdown signal arrives. The first
    /// tick fires after `first_tick_delay_secs`; subsequent ticks fire
    /// every `interval_hours`.
    pub async fn run_forever(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(
            delay_secs = self.config.first_tick_delay_secs,
            "scheduler started, waiting for first tick"
        );
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(self.config.first_tick_delay_secs)) => {}
            _ = shutdown_rx.recv() => {
                info!("shutdown requested before first tick, exiting");
                return Ok(());
            }
        }

        let interval_secs = (self.config.interval_hours.max(1) as u64) * 3600;
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first poll of a freshly built interval resolves immediately;
        // consuming it here makes the sleep above the effective first tick
        // and leaves the loop waiting a full interval before the next one.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, waiting for any in-flight pass to finish");
                    self.wait_for_quiescence().await;
                    info!("scheduler shut down");
                    return Ok(());
                }
            }
        }
    }

    /// Starts one pass in the background unless one is already running.
    fn tick(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("previous run still in progress, skipping this tick");
            return;
        }
        let orchestrator = Arc::clone(&self.orchestrator);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            match orchestrator.run().await {
                Ok(run) => info!(run_id = %run.id, status = ?run.status, "scheduled pass complete"),
                Err(err) => tracing::error!(error = %err, "scheduled pass could not even record a failure run"),
            }
            running.store(false, Ordering::Release);
        });
    }

    /// Polls `running` until it clears or `shutdown_grace_secs` elapses.
    async fn wait_for_quiescence(&self) {
        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_grace_secs);
        while self.running.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                warn!("shutdown grace window elapsed with a pass still running");
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
