//! Wire types for the batch/v1 Job and core/v1 Pod resources.
//!
//! Only the fields this service writes or reads are modelled. Field names
//! follow the Kubernetes JSON convention (camelCase).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A batch Job to submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: WorkloadSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub backoff_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<u32>,
    pub template: PodTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub restart_policy: String,
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    pub resources: Resources,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    pub post_start: LifecycleHandler,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleHandler {
    pub exec: ExecAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecAction {
    pub command: Vec<String>,
}

impl Lifecycle {
    /// Run `command` through `/bin/bash -c` once the container has started.
    pub fn post_start_shell(command: &str) -> Self {
        Self {
            post_start: LifecycleHandler {
                exec: ExecAction {
                    command: vec!["/bin/bash".into(), "-c".into(), command.to_string()],
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    pub fn value(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value.into()),
            value_from: None,
        }
    }

    /// A variable read from one key of a Secret.
    pub fn from_secret(name: &str, secret: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: SecretKeyRef {
                    name: secret.to_string(),
                    key: key.to_string(),
                },
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    pub secret_key_ref: SecretKeyRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// CPU/memory quantities, e.g. `{"cpu": "4", "memory": "4000Mi"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<ClaimSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDir>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSource {
    pub claim_name: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyDir {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

/// Live pod counts of a workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadCounts {
    pub active: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// A workload as the orchestrator reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub name: String,
    pub uid: String,
    pub counts: WorkloadCounts,
}

/// The parts of a batch Job GET/POST response we read.
#[derive(Debug, Deserialize)]
pub(crate) struct JobObject {
    pub metadata: ObjectRef,
    #[serde(default)]
    pub status: JobObjectStatus,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ObjectRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JobObjectStatus {
    pub active: Option<u32>,
    pub succeeded: Option<u32>,
    pub failed: Option<u32>,
}

impl From<JobObject> for Workload {
    fn from(job: JobObject) -> Self {
        Workload {
            name: job.metadata.name,
            uid: job.metadata.uid,
            counts: WorkloadCounts {
                active: job.status.active.unwrap_or(0),
                succeeded: job.status.succeeded.unwrap_or(0),
                failed: job.status.failed.unwrap_or(0),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PodList {
    #[serde(default)]
    pub items: Vec<PodObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PodObject {
    #[serde(default)]
    pub metadata: ObjectRef,
    #[serde(default)]
    pub status: PodObjectStatus,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PodObjectStatus {
    pub message: Option<String>,
}

/// `meta/v1 Status`, returned in error bodies.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiStatus {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_counts_default_to_zero() {
        let body = r#"{"metadata":{"name":"bakta-job-1","uid":"abc"},"status":{"active":1}}"#;
        let workload: Workload = serde_json::from_str::<JobObject>(body).unwrap().into();
        assert_eq!(workload.uid, "abc");
        assert_eq!(
            workload.counts,
            WorkloadCounts {
                active: 1,
                succeeded: 0,
                failed: 0
            }
        );

        let no_status: Workload =
            serde_json::from_str::<JobObject>(r#"{"metadata":{"name":"x","uid":"y"}}"#)
                .unwrap()
                .into();
        assert_eq!(no_status.counts, WorkloadCounts::default());
    }

    #[test]
    fn env_var_serialization() {
        let plain = serde_json::to_value(EnvVar::value("JobID", "42")).unwrap();
        assert_eq!(plain, serde_json::json!({"name": "JobID", "value": "42"}));

        let secret =
            serde_json::to_value(EnvVar::from_secret("AWS_ACCESS_KEY_ID", "s3", "AccessKey"))
                .unwrap();
        assert_eq!(
            secret,
            serde_json::json!({
                "name": "AWS_ACCESS_KEY_ID",
                "valueFrom": {"secretKeyRef": {"name": "s3", "key": "AccessKey"}}
            })
        );
    }

    #[test]
    fn volume_mount_omits_false_read_only() {
        let mount = VolumeMount {
            name: "cache-volume".into(),
            mount_path: "/cache".into(),
            read_only: false,
        };
        assert_eq!(
            serde_json::to_value(mount).unwrap(),
            serde_json::json!({"name": "cache-volume", "mountPath": "/cache"})
        );
    }
}
