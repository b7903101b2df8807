use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an annotation job.
///
/// `Succeeded` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Init,
    Pending,
    Running,
    Succeeded,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Error)
    }

    /// Ordering used to keep status writes monotonic. Both terminal states
    /// share the highest rank.
    pub(crate) fn rank(self) -> u8 {
        match self {
            JobStatus::Init => 0,
            JobStatus::Pending => 1,
            JobStatus::Running => 2,
            JobStatus::Succeeded | JobStatus::Error => 3,
        }
    }

    /// Map a phase string reported by the running workload.
    ///
    /// Unknown phases map to `Error` with a warning.
    pub fn from_phase(phase: &str) -> JobStatus {
        match phase {
            "Init" => JobStatus::Init,
            "Pending" => JobStatus::Pending,
            "Running" => JobStatus::Running,
            "Succeeded" => JobStatus::Succeeded,
            "Failed" | "Error" => JobStatus::Error,
            other => {
                tracing::warn!(phase = other, "unknown workload phase, treating as ERROR");
                JobStatus::Error
            }
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Init => write!(f, "INIT"),
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(JobStatus::Init),
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCEEDED" => Ok(JobStatus::Succeeded),
            "ERROR" => Ok(JobStatus::Error),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Format of the optional replicon table uploaded by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepliconTableType {
    Csv,
    #[default]
    Tsv,
}

/// Object-storage locations of a job's inputs and results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobKeys {
    pub data_bucket: String,
    pub fasta_key: String,
    pub prodigal_key: String,
    pub replicon_key: String,
    pub result_key: String,
}

/// The stored record of one annotation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub secret_hash: String,
    pub workload_id: Option<String>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub is_deleted: bool,
    pub keys: JobKeys,
    /// Annotate stage arguments recorded when the workload was submitted.
    pub config_string: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: Uuid,
        name: String,
        secret_hash: String,
        keys: JobKeys,
        retention: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            secret_hash,
            workload_id: None,
            status: JobStatus::Init,
            error_message: None,
            is_deleted: false,
            keys,
            config_string: None,
            created_at: now,
            updated_at: now,
            expiry_date: now + retention,
        }
    }
}

/// Strip a client supplied display name down to `[0-9A-Za-z_.]`, at most 63
/// characters, ending on an alphanumeric character.
pub fn sanitize_name(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(63)
        .collect();
    while cleaned
        .chars()
        .last()
        .is_some_and(|c| !c.is_ascii_alphanumeric())
    {
        cleaned.pop();
    }
    cleaned
}

#[cfg(test)]
pub(crate) fn test_keys(id: Uuid) -> JobKeys {
    JobKeys {
        data_bucket: "bakta".into(),
        fasta_key: format!("jobs/uploaddata/{id}/fastadata.fasta"),
        prodigal_key: format!("jobs/uploaddata/{id}/prodigaltraining.tf"),
        replicon_key: format!("jobs/uploaddata/{id}/replicons.tsv"),
        result_key: format!("jobs/results/{id}"),
    }
}
