//! Client-facing job operations, independent of transport.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{authorize, generate_secret, hash_secret};
use crate::error::{JobError, Result};
use crate::monitor::StatusMonitor;
use crate::scheduler::Scheduler;
use crate::spec_builder::JobConfig;
use crate::state_machine::{Job, JobChange, JobStatus, RepliconTableType, sanitize_name};
use crate::storage::{UrlSigner, job_keys, result_keys};
use crate::store::JobStore;
use crate::tasks::TaskQueue;

/// Job id plus the capability secret proving ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAuth {
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitJobResponse {
    pub job: JobAuth,
    pub upload_link_fasta: String,
    pub upload_link_prodigal: String,
    pub upload_link_replicons: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusEntry {
    #[serde(rename = "jobID")]
    pub job_id: Uuid,
    pub job_status: JobStatus,
    pub started: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailedJobReason {
    NotFound,
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJob {
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub job_status: FailedJobReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsStatusResponse {
    pub jobs: Vec<JobStatusEntry>,
    pub failed_jobs: Vec<FailedJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultResponse {
    #[serde(rename = "jobID")]
    pub job_id: Uuid,
    pub started: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
    #[serde(rename = "ResultFiles")]
    pub result_files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogsResponse {
    #[serde(rename = "jobID")]
    pub job_id: Uuid,
    pub logs: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub tool_version: String,
    pub db_version: String,
    pub backend_version: String,
}

/// Settings the service needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub bucket: String,
    pub base_key: String,
    pub retention: Duration,
    pub tool_version: String,
    pub db_version: String,
}

pub struct JobService {
    store: Arc<dyn JobStore>,
    signer: Arc<dyn UrlSigner>,
    scheduler: Arc<Scheduler>,
    monitor: Arc<StatusMonitor>,
    tasks: Arc<TaskQueue>,
    settings: ServiceSettings,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        signer: Arc<dyn UrlSigner>,
        scheduler: Arc<Scheduler>,
        monitor: Arc<StatusMonitor>,
        tasks: Arc<TaskQueue>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            signer,
            scheduler,
            monitor,
            tasks,
            settings,
        }
    }

    /// Create a job and hand out its secret and upload links. The secret is
    /// returned here once and never stored.
    pub async fn init_job(
        &self,
        name: &str,
        replicon_type: RepliconTableType,
    ) -> Result<InitJobResponse> {
        let id = Uuid::new_v4();
        let secret = generate_secret();
        let keys = job_keys(&self.settings.bucket, &self.settings.base_key, id, replicon_type);

        let upload_link_fasta = self.signer.presign_put(&keys.data_bucket, &keys.fasta_key)?;
        let upload_link_prodigal = self.signer.presign_put(&keys.data_bucket, &keys.prodigal_key)?;
        let upload_link_replicons =
            self.signer.presign_put(&keys.data_bucket, &keys.replicon_key)?;

        let job = Job::new(
            id,
            sanitize_name(name),
            hash_secret(&secret),
            keys,
            self.settings.retention,
        );
        self.store.insert(job).await?;
        tracing::info!(job_id = %id, "job created");

        Ok(InitJobResponse {
            job: JobAuth {
                job_id: id.to_string(),
                secret,
            },
            upload_link_fasta,
            upload_link_prodigal,
            upload_link_replicons,
        })
    }

    /// Submit the workload of an authorized job. A job can be started once.
    pub async fn start_job(&self, auth: &JobAuth, config: &JobConfig) -> Result<()> {
        let job = self.authorized(auth).await?;
        if job.workload_id.is_some() || job.status != JobStatus::Init {
            return Err(JobError::AlreadyStarted(job.id));
        }
        self.scheduler.start_job(job.id, config).await?;
        Ok(())
    }

    /// Status of every listed job. Per-job failures are reported in
    /// `failed_jobs`, not as an error.
    pub async fn get_jobs_status(&self, auths: &[JobAuth]) -> Result<JobsStatusResponse> {
        let ids: Vec<Uuid> = auths
            .iter()
            .filter_map(|a| a.job_id.parse().ok())
            .collect();
        let found: HashMap<Uuid, Job> = self
            .store
            .find_many(&ids)
            .await?
            .into_iter()
            .map(|job| (job.id, job))
            .collect();

        let mut response = JobsStatusResponse::default();
        for auth in auths {
            let job = auth
                .job_id
                .parse::<Uuid>()
                .ok()
                .and_then(|id| found.get(&id));
            let reason = match job {
                None => FailedJobReason::NotFound,
                Some(job) if authorize(job, &auth.secret).is_err() => FailedJobReason::Unauthorized,
                Some(job) => {
                    response.jobs.push(JobStatusEntry {
                        job_id: job.id,
                        job_status: job.status,
                        started: job.created_at,
                        updated: job.updated_at,
                        name: job.name.clone(),
                    });
                    continue;
                }
            };
            response.failed_jobs.push(FailedJob {
                job_id: auth.job_id.clone(),
                job_status: reason,
            });
        }
        Ok(response)
    }

    /// Download links for every result artifact. Links are produced whatever
    /// the job status; objects that were never uploaded simply do not resolve.
    pub async fn get_job_result(&self, auth: &JobAuth) -> Result<JobResultResponse> {
        let job = self.authorized(auth).await?;
        let mut result_files = BTreeMap::new();
        for (name, key) in result_keys(&job.keys.result_key) {
            let url = self.signer.presign_get(&job.keys.data_bucket, &key)?;
            result_files.insert(name.to_string(), url);
        }
        Ok(JobResultResponse {
            job_id: job.id,
            started: job.created_at,
            updated: job.updated_at,
            name: job.name,
            result_files,
        })
    }

    /// Log output of an authorized job. Empty until the workload has a pod,
    /// and again once the workload has been deleted.
    pub async fn get_job_logs(&self, auth: &JobAuth) -> Result<JobLogsResponse> {
        let job = self.authorized(auth).await?;
        let logs = if job.workload_id.is_none() || job.is_deleted {
            String::new()
        } else {
            self.monitor.logs(job.id).await?
        };
        Ok(JobLogsResponse {
            job_id: job.id,
            logs,
        })
    }

    /// Queue a status resolution for an authorized job.
    pub async fn request_update(&self, auth: &JobAuth) -> Result<()> {
        let job = self.authorized(auth).await?;
        self.queue_resolution(job.id)
    }

    /// Delete the job's workload and mark it deleted. Safe to repeat.
    pub async fn delete_job(&self, auth: &JobAuth) -> Result<()> {
        let job = self.authorized(auth).await?;
        if !job.is_deleted {
            self.scheduler.delete_job(job.id).await?;
            self.store.apply(job.id, JobChange::Deleted).await?;
        }
        Ok(())
    }

    pub fn version(&self) -> VersionResponse {
        VersionResponse {
            tool_version: self.settings.tool_version.clone(),
            db_version: self.settings.db_version.clone(),
            backend_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Status callback from a running workload. Records the reported phase
    /// if any, then queues a resolution against the orchestrator.
    pub async fn workload_update(
        &self,
        job_id: &str,
        phase: Option<&str>,
        error: Option<String>,
    ) -> Result<()> {
        let id = parse_job_id(job_id)?;
        if self.store.get(id).await?.is_none() {
            return Err(JobError::NotFound(job_id.to_string()));
        }
        if let Some(phase) = phase {
            let change = JobChange::Observed {
                status: JobStatus::from_phase(phase),
                error_message: error,
            };
            let transition = self.store.apply(id, change).await?;
            tracing::debug!(job_id = %id, phase, ?transition, "workload reported status");
        }
        self.queue_resolution(id)
    }

    fn queue_resolution(&self, job_id: Uuid) -> Result<()> {
        let monitor = self.monitor.clone();
        self.tasks.submit(async move {
            match monitor.resolve(job_id).await {
                Ok(status) => tracing::debug!(job_id = %job_id, %status, "status resolved"),
                Err(e) => tracing::warn!(job_id = %job_id, error = %e, "status resolution failed"),
            }
        })
    }

    async fn authorized(&self, auth: &JobAuth) -> Result<Job> {
        let id = parse_job_id(&auth.job_id)?;
        let job = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| JobError::NotFound(auth.job_id.clone()))?;
        authorize(&job, &auth.secret)?;
        Ok(job)
    }
}

/// An id that does not parse cannot name a stored job.
fn parse_job_id(raw: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|_| JobError::NotFound(raw.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{MonitorConfig, WorkloadConfig};
    use crate::orchestrator::{WorkloadCounts, workload_name};
    use crate::spec_builder::JobSpecBuilder;
    use crate::store::MemoryJobStore;
    use crate::testing::{FakeSigner, FakeWorkloadApi};

    pub(crate) struct Fixture {
        pub store: Arc<MemoryJobStore>,
        pub api: Arc<FakeWorkloadApi>,
        pub tasks: Arc<TaskQueue>,
        pub service: Arc<JobService>,
    }

    pub(crate) fn fixture() -> Fixture {
        let store = Arc::new(MemoryJobStore::new());
        let api = Arc::new(FakeWorkloadApi::new());
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            api.clone(),
            JobSpecBuilder::new("s3.example.org", 12, false),
            WorkloadConfig::default(),
        ));
        let monitor = Arc::new(StatusMonitor::new(
            store.clone(),
            api.clone(),
            scheduler.clone(),
            MonitorConfig {
                settle_delay_ms: 0,
                poll_interval_secs: 0,
                max_polls: 1,
                ..MonitorConfig::default()
            },
        ));
        let tasks = Arc::new(TaskQueue::new(4, 16));
        let service = Arc::new(JobService::new(
            store.clone(),
            Arc::new(FakeSigner),
            scheduler,
            monitor,
            tasks.clone(),
            ServiceSettings {
                bucket: "bakta".into(),
                base_key: "jobs".into(),
                retention: Duration::days(10),
                tool_version: "1.9".into(),
                db_version: "5.1".into(),
            },
        ));
        Fixture {
            store,
            api,
            tasks,
            service,
        }
    }

    fn job_id(auth: &JobAuth) -> Uuid {
        auth.job_id.parse().unwrap()
    }

    #[tokio::test]
    async fn init_job_stores_hash_and_returns_links() {
        let f = fixture();
        let init = f
            .service
            .init_job("E. coli K-12!", RepliconTableType::Csv)
            .await
            .unwrap();

        let id = job_id(&init.job);
        let job = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.name, "E._coli_K_12");
        assert_eq!(job.secret_hash, hash_secret(&init.job.secret));
        assert_ne!(job.secret_hash, init.job.secret);
        assert_eq!(job.status, JobStatus::Init);
        assert!(init.upload_link_fasta.ends_with(&format!("jobs/uploaddata/{id}/fastadata.fasta")));
        assert!(init.upload_link_prodigal.ends_with("prodigaltraining.tf"));
        assert!(init.upload_link_replicons.ends_with("replicons.csv"));
    }

    #[tokio::test]
    async fn start_job_requires_secret_and_runs_once() {
        let f = fixture();
        let init = f.service.init_job("job", RepliconTableType::Tsv).await.unwrap();
        let wrong = JobAuth {
            secret: "wrong".into(),
            ..init.job.clone()
        };

        let err = f
            .service
            .start_job(&wrong, &JobConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Unauthorized(_)));
        assert!(f.api.created.lock().unwrap().is_empty());

        f.service
            .start_job(&init.job, &JobConfig::default())
            .await
            .unwrap();
        let job = f.store.get(job_id(&init.job)).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);

        let err = f
            .service
            .start_job(&init.job, &JobConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::AlreadyStarted(_)));
        assert_eq!(f.api.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn start_unknown_or_malformed_job_is_not_found() {
        let f = fixture();
        for job_id in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
            let auth = JobAuth {
                job_id,
                secret: "s".into(),
            };
            let err = f
                .service
                .start_job(&auth, &JobConfig::default())
                .await
                .unwrap_err();
            assert!(matches!(err, JobError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn jobs_status_reports_failures_per_job() {
        let f = fixture();
        let a = f.service.init_job("a", RepliconTableType::Tsv).await.unwrap();
        let b = f.service.init_job("b", RepliconTableType::Tsv).await.unwrap();
        let unknown = Uuid::new_v4().to_string();

        let request = vec![
            a.job.clone(),
            JobAuth {
                secret: "wrong".into(),
                ..b.job.clone()
            },
            JobAuth {
                job_id: unknown.clone(),
                secret: "x".into(),
            },
            JobAuth {
                job_id: "garbage".into(),
                secret: "x".into(),
            },
        ];
        let response = f.service.get_jobs_status(&request).await.unwrap();

        assert_eq!(response.jobs.len(), 1);
        assert_eq!(response.jobs[0].job_id, job_id(&a.job));
        assert_eq!(response.jobs[0].job_status, JobStatus::Init);
        assert_eq!(response.jobs[0].name, "a");
        assert_eq!(
            response.failed_jobs,
            vec![
                FailedJob {
                    job_id: b.job.job_id.clone(),
                    job_status: FailedJobReason::Unauthorized
                },
                FailedJob {
                    job_id: unknown,
                    job_status: FailedJobReason::NotFound
                },
                FailedJob {
                    job_id: "garbage".into(),
                    job_status: FailedJobReason::NotFound
                },
            ]
        );
    }

    #[tokio::test]
    async fn job_result_lists_all_artifacts() {
        let f = fixture();
        let init = f.service.init_job("job", RepliconTableType::Tsv).await.unwrap();
        let result = f.service.get_job_result(&init.job).await.unwrap();
        assert_eq!(result.result_files.len(), 9);
        assert!(result.result_files["GFF3"].ends_with("/result.gff3"));
        assert!(result.result_files["GFF3"].contains("/get/"));
    }

    #[tokio::test]
    async fn delete_job_is_repeatable() {
        let f = fixture();
        let init = f.service.init_job("job", RepliconTableType::Tsv).await.unwrap();
        f.service
            .start_job(&init.job, &JobConfig::default())
            .await
            .unwrap();
        let id = job_id(&init.job);

        f.service.delete_job(&init.job).await.unwrap();
        f.service.delete_job(&init.job).await.unwrap();

        assert!(f.store.get(id).await.unwrap().unwrap().is_deleted);
        assert!(!f.api.contains(&workload_name(id)));
        assert_eq!(f.api.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_resolves_in_background() {
        let f = fixture();
        let init = f.service.init_job("job", RepliconTableType::Tsv).await.unwrap();
        f.service
            .start_job(&init.job, &JobConfig::default())
            .await
            .unwrap();
        let id = job_id(&init.job);
        f.api.put(&workload_name(id), WorkloadCounts {
            active: 0,
            succeeded: 1,
            failed: 0,
        });

        f.service.request_update(&init.job).await.unwrap();
        f.tasks.drain().await;

        let job = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.is_deleted);
    }

    #[tokio::test]
    async fn workload_callback_records_phase() {
        let f = fixture();
        let init = f.service.init_job("job", RepliconTableType::Tsv).await.unwrap();
        f.service
            .start_job(&init.job, &JobConfig::default())
            .await
            .unwrap();
        let id = job_id(&init.job);
        // Workload is already gone; only the callback's phase counts.
        f.api.remove(&workload_name(id));

        f.service
            .workload_update(&init.job.job_id, Some("Failed"), Some("bakta exited 1".into()))
            .await
            .unwrap();
        f.tasks.drain().await;

        let job = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_message.as_deref(), Some("bakta exited 1"));
    }

    #[tokio::test]
    async fn job_logs_require_secret_and_started_workload() {
        let f = fixture();
        let init = f.service.init_job("job", RepliconTableType::Tsv).await.unwrap();
        *f.api.logs.lock().unwrap() = Some("downloading inputs".into());

        let logs = f.service.get_job_logs(&init.job).await.unwrap();
        assert!(logs.logs.is_empty());

        f.service
            .start_job(&init.job, &JobConfig::default())
            .await
            .unwrap();
        let logs = f.service.get_job_logs(&init.job).await.unwrap();
        assert_eq!(logs.job_id, job_id(&init.job));
        assert_eq!(logs.logs, "downloading inputs");

        let wrong = JobAuth {
            secret: "wrong".into(),
            ..init.job.clone()
        };
        let err = f.service.get_job_logs(&wrong).await.unwrap_err();
        assert!(matches!(err, JobError::Unauthorized(_)));

        f.service.delete_job(&init.job).await.unwrap();
        assert!(f.service.get_job_logs(&init.job).await.unwrap().logs.is_empty());
    }

    #[tokio::test]
    async fn version_reports_configured_versions() {
        let f = fixture();
        let version = f.service.version();
        assert_eq!(version.tool_version, "1.9");
        assert_eq!(version.db_version, "5.1");
        assert!(!version.backend_version.is_empty());
    }
}
