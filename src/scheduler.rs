use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::WorkloadConfig;
use crate::error::{JobError, Result};
use crate::orchestrator::types::{
    ClaimSource, Container, EmptyDir, EnvVar, Lifecycle, ObjectMeta, PodSpec, PodTemplate,
    Resources, Volume, VolumeMount, WorkloadSpec,
};
use crate::orchestrator::{OrchestratorError, Workload, WorkloadApi, WorkloadManifest, workload_name};
use crate::spec_builder::{JobConfig, JobSpecBuilder, StageSpecs};
use crate::state_machine::{JobChange, Transition};
use crate::store::JobStore;

const CONTAINER_NAME: &str = "bakta-job";
const DATABASE_VOLUME: &str = "database";
const CACHE_VOLUME: &str = "cache-volume";

/// Submits and deletes the workload backing a job.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    api: Arc<dyn WorkloadApi>,
    specs: JobSpecBuilder,
    template: WorkloadConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        api: Arc<dyn WorkloadApi>,
        specs: JobSpecBuilder,
        template: WorkloadConfig,
    ) -> Self {
        Self {
            store,
            api,
            specs,
            template,
        }
    }

    /// Build and submit the workload for `job_id`, then record its UID.
    ///
    /// Does not check whether the job already has a workload; a second
    /// submission under the same name fails with `AlreadyExists`.
    pub async fn start_job(&self, job_id: Uuid, config: &JobConfig) -> Result<Workload> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        let specs = self.specs.build(&job, config);
        let manifest = self.manifest(job_id, &specs);

        let workload = match self.api.create_workload(&manifest).await {
            Ok(workload) => workload,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "workload submission failed");
                return Err(e.into());
            }
        };

        let transition = self
            .store
            .apply(
                job_id,
                JobChange::WorkloadSubmitted {
                    workload_id: workload.uid.clone(),
                    config_string: specs.annotate,
                },
            )
            .await?;
        if let Transition::Rejected { current, .. } = transition {
            tracing::warn!(job_id = %job_id, %current, "workload submitted but job record not updated");
        }

        tracing::info!(job_id = %job_id, workload = %workload.name, uid = %workload.uid, "workload submitted");
        Ok(workload)
    }

    /// Delete the workload of `job_id`. An absent workload counts as deleted.
    pub async fn delete_job(&self, job_id: Uuid) -> Result<()> {
        let name = workload_name(job_id);
        match self.api.delete_workload(&name).await {
            Ok(()) => {
                tracing::info!(job_id = %job_id, workload = %name, "workload deleted");
                Ok(())
            }
            Err(OrchestratorError::NotFound(_)) => {
                tracing::debug!(job_id = %job_id, workload = %name, "workload already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The batch Job descriptor for one submission.
    pub fn manifest(&self, job_id: Uuid, specs: &StageSpecs) -> WorkloadManifest {
        let t = &self.template;
        let labels = BTreeMap::from([("jobid".to_string(), job_id.to_string())]);

        let quantities = |cpu: &str, memory: &str| {
            BTreeMap::from([
                ("cpu".to_string(), cpu.to_string()),
                ("memory".to_string(), memory.to_string()),
            ])
        };

        let env = vec![
            EnvVar::value("DownloaderEnvConfig", specs.download.as_str()),
            EnvVar::value("BaktaEnvConfig", specs.annotate.as_str()),
            EnvVar::value("UploaderEnvConfig", specs.upload.as_str()),
            EnvVar::value("JobID", job_id.to_string()),
            EnvVar::value("GRPCUpdaterEndpoint", t.callback_service.as_str()),
            EnvVar::value("GRPCUpdaterPort", t.callback_port.to_string()),
            EnvVar::from_secret("AWS_ACCESS_KEY_ID", &t.storage_secret, "AccessKey"),
            EnvVar::from_secret("AWS_SECRET_ACCESS_KEY", &t.storage_secret, "SecretKey"),
        ];

        let container = Container {
            name: CONTAINER_NAME.to_string(),
            image: t.image.clone(),
            env,
            resources: Resources {
                requests: quantities(&t.cpu_request, &t.memory_request),
                limits: quantities(&t.cpu_limit, &t.memory_limit),
            },
            volume_mounts: vec![
                VolumeMount {
                    name: DATABASE_VOLUME.to_string(),
                    mount_path: "/db".to_string(),
                    read_only: true,
                },
                VolumeMount {
                    name: CACHE_VOLUME.to_string(),
                    mount_path: "/cache".to_string(),
                    read_only: false,
                },
            ],
            lifecycle: t.post_start_command.as_deref().map(Lifecycle::post_start_shell),
        };

        WorkloadManifest {
            api_version: "batch/v1".to_string(),
            kind: "Job".to_string(),
            metadata: ObjectMeta {
                name: workload_name(job_id),
                labels: labels.clone(),
            },
            spec: WorkloadSpec {
                backoff_limit: t.backoff_limit,
                ttl_seconds_after_finished: t.ttl_seconds_after_finished,
                template: PodTemplate {
                    metadata: ObjectMeta {
                        name: String::new(),
                        labels,
                    },
                    spec: PodSpec {
                        restart_policy: "Never".to_string(),
                        containers: vec![container],
                        volumes: vec![
                            Volume {
                                name: CACHE_VOLUME.to_string(),
                                persistent_volume_claim: None,
                                empty_dir: Some(EmptyDir {}),
                            },
                            Volume {
                                name: DATABASE_VOLUME.to_string(),
                                persistent_volume_claim: Some(ClaimSource {
                                    claim_name: t.database_claim.clone(),
                                    read_only: true,
                                }),
                                empty_dir: None,
                            },
                        ],
                    },
                },
            },
        }
    }
}
