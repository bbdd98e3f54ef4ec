use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::error::{RepositoryError, SyncError};
use crate::models::{SyncOutcome, SyncRun};
use crate::sync::engine::Reconciler;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 50;

/// Snapshot returned by `SyncCoordinator::status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub is_running: bool,
    /// Latest run that reached `completed` or `failed`
    pub last_run: Option<SyncRun>,
}

/// Single-flight front door for reconciliation cycles.
///
/// Manual and scheduled triggers share one in-process flag. A trigger that
/// finds it taken is rejected, never queued. The flag is not shared across
/// processes, so only one coordinator may drive a given store.
#[derive(Clone)]
pub struct SyncCoordinator {
    reconciler: Arc<Reconciler>,
    running: Arc<AtomicBool>,
}

/// Holds the running flag; releases it on drop, including on panic.
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, SyncError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyRunning)?;

        Ok(Self { flag: flag.clone() })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SyncCoordinator {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run a cycle on the current task and wait for it.
    pub async fn run_now(&self) -> Result<SyncOutcome, SyncError> {
        let _guard = RunGuard::acquire(&self.running)?;
        self.reconciler.run_cycle().await
    }

    /// Start a cycle in the background.
    ///
    /// The guard is taken before this returns, so a second call made right
    /// after the first is rejected even if the spawned task has not been
    /// polled yet. Await the handle to observe the cycle's result.
    pub fn trigger_manual(&self) -> Result<JoinHandle<Result<SyncOutcome, SyncError>>, SyncError> {
        let guard = RunGuard::acquire(&self.running)?;
        let reconciler = self.reconciler.clone();

        info!("Manual sync triggered");
        Ok(tokio::spawn(async move {
            let _guard = guard;
            reconciler.run_cycle().await
        }))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn last_status(&self) -> Result<Option<SyncRun>, RepositoryError> {
        self.reconciler.repository().latest_finished_run().await
    }

    pub async fn status(&self) -> Result<StatusReport, RepositoryError> {
        Ok(StatusReport {
            is_running: self.is_running(),
            last_run: self.last_status().await?,
        })
    }

    /// Run log, most recent first. `None` means the default page size.
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<SyncRun>, RepositoryError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.reconciler.repository().recent_runs(limit).await
    }

    /// Arm a recurring cycle and start the scheduler.
    ///
    /// Accepts 5-field (minute-first) or 6-field (second-first) cron
    /// expressions. A tick that lands while a cycle is running is skipped.
    pub async fn schedule_recurring(&self, expression: &str) -> Result<JobScheduler> {
        let schedule = to_scheduler_expression(expression);
        let scheduler = JobScheduler::new()
            .await
            .context("Failed to create scheduler")?;

        let coordinator = self.clone();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let coordinator = coordinator.clone();
            Box::pin(async move {
                match coordinator.run_now().await {
                    Ok(_) => {}
                    Err(SyncError::AlreadyRunning) => {
                        warn!("Scheduled sync skipped, a cycle is already running");
                    }
                    Err(e) => error!("Scheduled sync failed: {}", e),
                }
            })
        })
        .with_context(|| format!("Invalid sync schedule '{}'", expression))?;

        scheduler.add(job).await.context("Failed to add sync job")?;
        scheduler
            .start()
            .await
            .context("Failed to start scheduler")?;

        info!("Recurring sync scheduled: {}", schedule);
        Ok(scheduler)
    }
}

/// Promote a classic 5-field cron expression to the seconds-first form.
pub fn to_scheduler_expression(expression: &str) -> String {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    }
}
