//! Periodic repair of jobs stuck in RUNNING without a workload.
//!
//! A job can be left RUNNING when its workload disappears without a final
//! status reaching the service (node loss, manual deletion, missed callback).
//! Each cycle scans RUNNING jobs and checks their workloads with a fixed pool of
//! workers fed from a bounded queue.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::ReconcilerConfig;
use crate::error::Result;
use crate::orchestrator::{WorkloadApi, workload_name};
use crate::state_machine::{Job, JobChange, JobStatus, Transition};
use crate::store::JobStore;

pub const STRAGGLER_MESSAGE: &str =
    "job was in running state but no running workload could be found";

/// What a single check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The workload exists.
    Present,
    /// The job was marked ERROR and deleted.
    Repaired,
    /// The job changed between the scan and the check and was left alone.
    ConsistencyConflict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub repaired: usize,
    pub conflicts: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Present => {}
            ReconcileOutcome::Repaired => self.repaired += 1,
            ReconcileOutcome::ConsistencyConflict => self.conflicts += 1,
        }
    }
}

pub struct StragglerReconciler {
    store: Arc<dyn JobStore>,
    api: Arc<dyn WorkloadApi>,
    config: ReconcilerConfig,
}

impl StragglerReconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        api: Arc<dyn WorkloadApi>,
        config: ReconcilerConfig,
    ) -> Self {
        Self { store, api, config }
    }

    /// Run cycles every interval until `shutdown` fires. The first cycle is
    /// delayed by a random offset so replicas do not sweep in lockstep.
    pub async fn run(&self, shutdown: CancellationToken) {
        let interval = self.config.interval();
        let jitter = if interval.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..interval.as_millis() as u64))
        };
        tracing::info!(?interval, ?jitter, "straggler reconciler started");

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(jitter) => {}
        }

        loop {
            tracing::info!("starting cleanup cycle");
            match self.run_cycle().await {
                Ok(report) => tracing::info!(
                    scanned = report.scanned,
                    repaired = report.repaired,
                    conflicts = report.conflicts,
                    "finished cleanup cycle"
                ),
                Err(e) => tracing::error!(error = %e, "cleanup cycle failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(interval) => {}
            }
        }
        tracing::info!("straggler reconciler stopped");
    }

    /// One sweep over all RUNNING jobs. Stops at the first orchestrator or
    /// store error, aborting the remaining checks.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let jobs = self.store.find_by_status(JobStatus::Running).await?;
        let mut report = CycleReport {
            scanned: jobs.len(),
            ..CycleReport::default()
        };
        if jobs.is_empty() {
            return Ok(report);
        }

        let (tx, rx) = mpsc::channel::<Job>(self.config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let producer = tokio::spawn(async move {
            for job in jobs {
                if tx.send(job).await.is_err() {
                    break;
                }
            }
        });

        let mut workers = JoinSet::new();
        for _ in 0..self.config.workers.clamp(1, report.scanned) {
            let rx = rx.clone();
            let store = self.store.clone();
            let api = self.api.clone();
            workers.spawn(async move {
                let mut partial = CycleReport::default();
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(job) = next else { break };
                    partial.record(check_job(store.as_ref(), api.as_ref(), &job).await?);
                }
                Ok::<_, crate::error::JobError>(partial)
            });
        }

        while let Some(joined) = workers.join_next().await {
            let partial = match joined {
                Ok(Ok(partial)) => partial,
                Ok(Err(e)) => {
                    workers.abort_all();
                    producer.abort();
                    return Err(e);
                }
                Err(e) => std::panic::resume_unwind(e.into_panic()),
            };
            report.repaired += partial.repaired;
            report.conflicts += partial.conflicts;
        }
        Ok(report)
    }
}

/// Check one RUNNING job. The job is re-read before repairing so a job that
/// finished or was deleted since the scan is not overwritten.
async fn check_job(
    store: &dyn JobStore,
    api: &dyn WorkloadApi,
    job: &Job,
) -> Result<ReconcileOutcome> {
    match api.get_workload(&workload_name(job.id)).await {
        Ok(_) => return Ok(ReconcileOutcome::Present),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }

    let still_running = store
        .get(job.id)
        .await?
        .is_some_and(|current| current.status == JobStatus::Running && !current.is_deleted);
    if !still_running {
        tracing::debug!(job_id = %job.id, "job changed during cleanup, skipping");
        return Ok(ReconcileOutcome::ConsistencyConflict);
    }

    let change = JobChange::StragglerRepaired {
        message: STRAGGLER_MESSAGE.to_string(),
    };
    match store.apply(job.id, change).await? {
        Transition::Applied { .. } => {
            tracing::info!(job_id = %job.id, "marked straggler job as failed");
            Ok(ReconcileOutcome::Repaired)
        }
        other => {
            tracing::debug!(job_id = %job.id, transition = ?other, "job changed during cleanup, skipping");
            Ok(ReconcileOutcome::ConsistencyConflict)
        }
    }
}
