use async_trait::async_trait;
use reqwest::{Certificate, Client, Response, StatusCode};
use serde_json::json;

use super::WorkloadApi;
use super::error::OrchestratorError;
use super::types::{ApiStatus, JobObject, PodList, PodObject, Workload, WorkloadManifest};
use crate::config::OrchestratorConfig;

/// Kubernetes REST client for batch Jobs and their pods.
pub struct KubeClient {
    client: Client,
    base_url: String,
    namespace: String,
    token: String,
}

impl KubeClient {
    /// Build a client from configuration. `ca_pem` is an extra root
    /// certificate bundle for the API server.
    pub fn new(
        config: &OrchestratorConfig,
        ca_pem: Option<&[u8]>,
    ) -> Result<Self, OrchestratorError> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout());
        if let Some(pem) = ca_pem {
            builder = builder.add_root_certificate(Certificate::from_pem(pem)?);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            token: config.token.clone(),
        })
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(
        base_url: &str,
        namespace: &str,
        token: &str,
    ) -> Result<Self, OrchestratorError> {
        let config = OrchestratorConfig {
            api_url: base_url.to_string(),
            namespace: namespace.to_string(),
            token: token.to_string(),
            ..OrchestratorConfig::default()
        };
        Self::new(&config, None)
    }

    fn jobs_url(&self) -> String {
        format!("{}/apis/batch/v1/namespaces/{}/jobs", self.base_url, self.namespace)
    }

    fn job_url(&self, name: &str) -> String {
        format!("{}/{name}", self.jobs_url())
    }

    fn pods_url(&self) -> String {
        format!("{}/api/v1/namespaces/{}/pods", self.base_url, self.namespace)
    }

    /// The most recent pod of `workload`.
    async fn latest_pod(&self, workload: &str) -> Result<PodObject, OrchestratorError> {
        let response = self
            .client
            .get(self.pods_url())
            .bearer_auth(&self.token)
            .query(&[("labelSelector", format!("job-name={workload}"))])
            .send()
            .await?;
        let pods = check(response, workload).await?.json::<PodList>().await?;
        pods.items
            .into_iter()
            .last()
            .ok_or_else(|| OrchestratorError::NoPods(workload.to_string()))
    }
}

/// Map non-2xx responses onto [`OrchestratorError`].
async fn check(response: Response, name: &str) -> Result<Response, OrchestratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::NOT_FOUND => Err(OrchestratorError::NotFound(name.to_string())),
        StatusCode::CONFLICT => Err(OrchestratorError::AlreadyExists(name.to_string())),
        _ => {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let message = serde_json::from_str::<ApiStatus>(&body)
                .map(|s| s.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            Err(OrchestratorError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl WorkloadApi for KubeClient {
    async fn create_workload(
        &self,
        manifest: &WorkloadManifest,
    ) -> Result<Workload, OrchestratorError> {
        let response = self
            .client
            .post(self.jobs_url())
            .bearer_auth(&self.token)
            .json(manifest)
            .send()
            .await?;
        let body = check(response, &manifest.metadata.name)
            .await?
            .json::<JobObject>()
            .await?;
        Ok(body.into())
    }

    async fn get_workload(&self, name: &str) -> Result<Workload, OrchestratorError> {
        let response = self
            .client
            .get(self.job_url(name))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body = check(response, name).await?.json::<JobObject>().await?;
        Ok(body.into())
    }

    async fn delete_workload(&self, name: &str) -> Result<(), OrchestratorError> {
        let options = json!({
            "kind": "DeleteOptions",
            "apiVersion": "v1",
            "propagationPolicy": "Foreground",
        });
        let response = self
            .client
            .delete(self.job_url(name))
            .bearer_auth(&self.token)
            .json(&options)
            .send()
            .await?;
        check(response, name).await?;
        Ok(())
    }

    async fn latest_pod_message(&self, workload: &str) -> Result<String, OrchestratorError> {
        let pod = self.latest_pod(workload).await?;
        Ok(pod.status.message.unwrap_or_default())
    }

    async fn workload_logs(&self, workload: &str) -> Result<String, OrchestratorError> {
        let pod = self.latest_pod(workload).await?;
        let response = self
            .client
            .get(format!("{}/{}/log", self.pods_url(), pod.metadata.name))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(check(response, &pod.metadata.name).await?.text().await?)
    }
}
