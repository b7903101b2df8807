//! Live status of a job's workload.

use std::sync::Arc;

use tokio::time::sleep;
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::{JobError, Result};
use crate::orchestrator::{OrchestratorError, WorkloadApi, WorkloadCounts, workload_name};
use crate::scheduler::Scheduler;
use crate::state_machine::{Job, JobChange, JobStatus, Transition};
use crate::store::JobStore;

/// One observation of a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: JobStatus,
    /// Pod diagnostics, only looked up when the counts are inconclusive.
    pub error_message: String,
}

/// Map pod counts to a status. Total over all inputs.
pub fn status_from_counts(counts: WorkloadCounts) -> JobStatus {
    if counts.active >= 1 {
        JobStatus::Running
    } else if counts.succeeded >= 1 {
        JobStatus::Succeeded
    } else if counts.failed >= 1 {
        JobStatus::Error
    } else {
        JobStatus::Init
    }
}

pub struct StatusMonitor {
    store: Arc<dyn JobStore>,
    api: Arc<dyn WorkloadApi>,
    scheduler: Arc<Scheduler>,
    config: MonitorConfig,
}

impl StatusMonitor {
    pub fn new(
        store: Arc<dyn JobStore>,
        api: Arc<dyn WorkloadApi>,
        scheduler: Arc<Scheduler>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            api,
            scheduler,
            config,
        }
    }

    /// Read the workload of `job_id` after the settle delay.
    pub async fn get_status(
        &self,
        job_id: Uuid,
    ) -> std::result::Result<StatusReport, OrchestratorError> {
        let name = workload_name(job_id);
        sleep(self.config.settle_delay()).await;

        let workload = self.api.get_workload(&name).await?;
        let status = status_from_counts(workload.counts);

        let error_message = if status == JobStatus::Init {
            match self.api.latest_pod_message(&name).await {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "could not read pod diagnostics");
                    String::new()
                }
            }
        } else {
            String::new()
        };

        Ok(StatusReport {
            status,
            error_message,
        })
    }

    /// Log output of the job's workload. A workload that is gone or has no
    /// pod yet has no logs.
    pub async fn logs(&self, job_id: Uuid) -> std::result::Result<String, OrchestratorError> {
        match self.api.workload_logs(&workload_name(job_id)).await {
            Ok(logs) => Ok(logs),
            Err(e @ (OrchestratorError::NotFound(_) | OrchestratorError::NoPods(_))) => {
                tracing::debug!(job_id = %job_id, error = %e, "no workload logs available");
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Poll until the job reaches a terminal status or polls run out, writing
    /// each observation to the store. A terminal job has its workload deleted
    /// once; a job already marked deleted is never polled or deleted again.
    pub async fn resolve(&self, job_id: Uuid) -> Result<JobStatus> {
        let job = self.load(job_id).await?;
        if job.is_deleted {
            tracing::debug!(
                job_id = %job_id,
                status = %job.status,
                "job already deleted, skipping resolution"
            );
            return Ok(job.status);
        }
        let mut current = job.status;

        for attempt in 0..self.config.max_polls {
            if current.is_terminal() {
                break;
            }
            if attempt > 0 {
                sleep(self.config.poll_interval()).await;
            }

            let report = self.get_status(job_id).await?;
            let change = JobChange::Observed {
                status: report.status,
                error_message: Some(report.error_message),
            };
            current = match self.store.apply(job_id, change).await? {
                Transition::Applied { from, to } => {
                    tracing::info!(job_id = %job_id, %from, %to, "job status changed");
                    to
                }
                Transition::Unchanged(status) => status,
                Transition::Rejected { current, requested } => {
                    tracing::debug!(job_id = %job_id, %current, %requested, "stale status observation ignored");
                    current
                }
            };
        }

        if current.is_terminal() {
            // The sweep or a client delete may have won the race while polling.
            if self.load(job_id).await?.is_deleted {
                return Ok(current);
            }
            self.scheduler.delete_job(job_id).await?;
            self.store.apply(job_id, JobChange::Deleted).await?;
        }
        Ok(current)
    }

    async fn load(&self, job_id: Uuid) -> Result<Job> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }
}
