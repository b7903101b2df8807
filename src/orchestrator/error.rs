use thiserror::Error;

/// Errors from the cluster orchestrator API.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// HTTP 404. Callers decide whether an absent workload is a failure.
    #[error("workload not found: {0}")]
    NotFound(String),

    /// HTTP 409, a workload with this name already exists.
    #[error("workload already exists: {0}")]
    AlreadyExists(String),

    #[error("orchestrator API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("no pods found for workload {0}")]
    NoPods(String),
}

impl OrchestratorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrchestratorError::NotFound(_))
    }
}
