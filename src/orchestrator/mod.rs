//! Cluster orchestrator access.
//!
//! [`WorkloadApi`] is the seam the scheduler, monitor and reconciler talk to;
//! [`KubeClient`] implements it against the Kubernetes REST API.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;
use uuid::Uuid;

pub use client::KubeClient;
pub use error::OrchestratorError;
pub use types::{Workload, WorkloadCounts, WorkloadManifest};

#[async_trait]
pub trait WorkloadApi: Send + Sync {
    /// Submit a workload. A name clash is [`OrchestratorError::AlreadyExists`].
    async fn create_workload(
        &self,
        manifest: &WorkloadManifest,
    ) -> Result<Workload, OrchestratorError>;

    async fn get_workload(&self, name: &str) -> Result<Workload, OrchestratorError>;

    /// Delete a workload and its pods (foreground propagation).
    async fn delete_workload(&self, name: &str) -> Result<(), OrchestratorError>;

    /// Terminal message of the most recent pod of `workload`.
    async fn latest_pod_message(&self, workload: &str) -> Result<String, OrchestratorError>;

    /// Log output of the most recent pod of `workload`.
    async fn workload_logs(&self, workload: &str) -> Result<String, OrchestratorError>;
}

/// Name of the workload that runs `job_id`.
pub fn workload_name(job_id: Uuid) -> String {
    format!("bakta-job-{job_id}")
}
