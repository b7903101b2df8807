//! Job persistence.
//!
//! All mutation goes through [`JobStore::apply`], which runs the change through
//! the [`StateMachine`] while holding the record, so concurrent writers cannot
//! move a job backwards or out of a terminal state.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::state_machine::{Job, JobChange, JobStatus, StateMachine, Transition};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} already exists")]
    Duplicate(Uuid),

    #[error("job {0} does not exist")]
    NotFound(Uuid),

    #[error("job store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Rejects an id that is already stored.
    async fn insert(&self, job: Job) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// The stored jobs among `ids`; unknown ids are skipped.
    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Job>, StoreError>;

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;

    async fn apply(&self, id: Uuid, change: JobChange) -> Result<Transition, StoreError>;
}

/// In-process store. State is lost on restart.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(ids.iter().filter_map(|id| jobs.get(id).cloned()).collect())
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().filter(|j| j.status == status).cloned().collect())
    }

    async fn apply(&self, id: Uuid, change: JobChange) -> Result<Transition, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let transition = StateMachine::apply(job, change);
        if let Transition::Rejected { current, requested } = transition {
            tracing::debug!(job_id = %id, %current, %requested, "job change rejected");
        }
        Ok(transition)
    }
}
