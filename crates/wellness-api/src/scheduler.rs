use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use wellness_core::sync::{SyncEngine, SyncResult, SyncSummary};

use crate::config::AppConfig;

pub const SYNC_CLIENTS_JOB: &str = "sync_clients";
pub const SYNC_APPOINTMENTS_JOB: &str = "sync_appointments";

// A job is considered alive while its last tick is younger than twice its
// interval, which tolerates one slow pass without flapping the health probe.
pub struct JobPulse {
    name: &'static str,
    interval: Duration,
    last_run_millis: AtomicI64,
}

impl JobPulse {
    fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            last_run_millis: AtomicI64::new(0),
        }
    }

    fn stamp(&self) {
        self.last_run_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn is_alive(&self) -> bool {
        let last = self.last_run_millis.load(Ordering::Relaxed);
        if last == 0 {
            // No tick has completed yet
            return false;
        }
        let stale_after = i64::try_from(self.interval.as_millis() * 2).unwrap_or(i64::MAX);
        Utc::now().timestamp_millis() - last <= stale_after
    }
}

/// Liveness view over every registered recurring job
#[derive(Default)]
pub struct SchedulerHealth {
    pulses: Vec<Arc<JobPulse>>,
}

impl SchedulerHealth {
    fn register(&mut self, name: &'static str, interval: Duration) -> Arc<JobPulse> {
        let pulse = Arc::new(JobPulse::new(name, interval));
        self.pulses.push(Arc::clone(&pulse));
        pulse
    }

    pub fn all_alive(&self) -> bool {
        self.pulses.iter().all(|pulse| pulse.is_alive())
    }
}

#[derive(Clone, Copy)]
enum SyncJob {
    Clients,
    Appointments,
}

impl SyncJob {
    async fn run(self, engine: &SyncEngine) -> SyncResult<SyncSummary> {
        match self {
            Self::Clients => engine.sync_all_clients().await,
            Self::Appointments => engine.sync_all_appointments().await,
        }
    }
}

/// Start both periodic sync loops; the first tick of each fires immediately
pub fn spawn_sync_jobs(engine: &SyncEngine, config: &AppConfig) -> SchedulerHealth {
    let mut health = SchedulerHealth::default();

    let pulse = health.register(SYNC_CLIENTS_JOB, config.sync_clients_interval);
    spawn_recurring(engine.clone(), pulse, SyncJob::Clients);

    let pulse = health.register(SYNC_APPOINTMENTS_JOB, config.sync_appointments_interval);
    spawn_recurring(engine.clone(), pulse, SyncJob::Appointments);

    health
}

fn spawn_recurring(engine: SyncEngine, pulse: Arc<JobPulse>, job: SyncJob) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(pulse.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            // Run each pass in its own task so a panic is contained and the
            // loop keeps ticking
            let tick_engine = engine.clone();
            let outcome = tokio::spawn(async move { job.run(&tick_engine).await }).await;
            match outcome {
                Ok(Ok(summary)) => {
                    tracing::info!(
                        job = pulse.name,
                        seen = summary.seen,
                        applied = summary.applied,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        "Sync pass finished"
                    );
                }
                Ok(Err(error)) => {
                    tracing::error!(job = pulse.name, "Sync pass failed: {error}");
                }
                Err(join_error) => {
                    tracing::error!(job = pulse.name, "Sync task panicked: {join_error}");
                }
            }

            // The pulse tracks the loop, not the remote: a failed pass still
            // counts as a completed tick
            pulse.stamp();
        }
    });
}
