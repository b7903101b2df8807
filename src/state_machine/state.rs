use chrono::Utc;

use super::job::{Job, JobStatus};

/// A requested change to a stored job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobChange {
    /// The workload was accepted by the orchestrator.
    WorkloadSubmitted {
        workload_id: String,
        config_string: String,
    },
    /// A status observed on the orchestrator or reported by the workload.
    Observed {
        status: JobStatus,
        error_message: Option<String>,
    },
    /// The job claims to be running but its workload is gone.
    StragglerRepaired { message: String },
    /// The backing workload has been reclaimed.
    Deleted,
}

/// The result of applying a [`JobChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The job moved from one status to another.
    Applied { from: JobStatus, to: JobStatus },
    /// Nothing to do; the job already reflects the change.
    Unchanged(JobStatus),
    /// The change conflicts with the job's current state and was dropped.
    Rejected {
        current: JobStatus,
        requested: JobStatus,
    },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Enforces the job lifecycle: INIT → PENDING → RUNNING → SUCCEEDED | ERROR.
///
/// - Forward moves are applied, equal status is `Unchanged`, anything else is
///   `Rejected`. Terminal states never change again.
/// - A workload id is recorded once; a second submission is rejected.
/// - Straggler repair only applies to a `Running` job that is not yet deleted.
/// - `is_deleted` only ever goes from false to true.
pub struct StateMachine;

impl StateMachine {
    pub fn apply(job: &mut Job, change: JobChange) -> Transition {
        let transition = match change {
            JobChange::WorkloadSubmitted {
                workload_id,
                config_string,
            } => {
                if job.workload_id.is_some() || job.status.rank() >= JobStatus::Running.rank() {
                    return Transition::Rejected {
                        current: job.status,
                        requested: JobStatus::Running,
                    };
                }
                job.workload_id = Some(workload_id);
                job.config_string = Some(config_string);
                Self::advance(job, JobStatus::Running, None)
            }
            JobChange::Observed {
                status,
                error_message,
            } => Self::advance(job, status, error_message),
            JobChange::StragglerRepaired { message } => {
                if job.status != JobStatus::Running || job.is_deleted {
                    return Transition::Rejected {
                        current: job.status,
                        requested: JobStatus::Error,
                    };
                }
                job.is_deleted = true;
                Self::advance(job, JobStatus::Error, Some(message))
            }
            JobChange::Deleted => {
                if !job.is_deleted {
                    job.is_deleted = true;
                    job.updated_at = Utc::now();
                }
                Transition::Unchanged(job.status)
            }
        };

        if transition.is_applied() {
            job.updated_at = Utc::now();
        }
        transition
    }

    fn advance(job: &mut Job, to: JobStatus, error_message: Option<String>) -> Transition {
        let from = job.status;
        if from == to {
            return Transition::Unchanged(from);
        }
        if from.is_terminal() || to.rank() < from.rank() {
            return Transition::Rejected {
                current: from,
                requested: to,
            };
        }

        job.status = to;
        if to == JobStatus::Error {
            job.error_message = error_message.filter(|m| !m.is_empty());
        }
        Transition::Applied { from, to }
    }
}
