//! Object-storage layout and presigned URLs.
//!
//! Uploads land under `<base>/uploaddata/<job>/`, results under
//! `<base>/results/<job>/result.<suffix>`. Clients only ever see presigned
//! URLs; [`S3Presigner`] produces them with AWS Signature V4 query signing.

use std::time::Duration;

use http::Method;
use reqsign::{AwsCredential, AwsV4Signer};
use reqwest::Url;
use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::spec_builder::RESULT_ARTIFACTS;
use crate::state_machine::{JobKeys, RepliconTableType};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to sign request: {0}")]
    Signing(String),
}

/// Produces time-limited URLs for a single object.
pub trait UrlSigner: Send + Sync {
    fn presign_put(&self, bucket: &str, key: &str) -> Result<String, StorageError>;
    fn presign_get(&self, bucket: &str, key: &str) -> Result<String, StorageError>;
}

/// Object keys for a new job.
pub fn job_keys(
    bucket: &str,
    base_key: &str,
    job_id: Uuid,
    replicon_type: RepliconTableType,
) -> JobKeys {
    let upload = format!("{base_key}/uploaddata/{job_id}");
    let replicon_file = match replicon_type {
        RepliconTableType::Tsv => "replicons.tsv",
        RepliconTableType::Csv => "replicons.csv",
    };
    JobKeys {
        data_bucket: bucket.to_string(),
        fasta_key: format!("{upload}/fastadata.fasta"),
        prodigal_key: format!("{upload}/prodigaltraining.tf"),
        replicon_key: format!("{upload}/{replicon_file}"),
        result_key: format!("{base_key}/results/{job_id}"),
    }
}

/// (artifact name, object key) for every result artifact of a job.
pub fn result_keys(result_key: &str) -> Vec<(&'static str, String)> {
    RESULT_ARTIFACTS
        .iter()
        .map(|(name, suffix)| (*name, format!("{result_key}/result.{suffix}")))
        .collect()
}

/// SigV4 query-string presigner using virtual-hosted-style URLs
/// (`https://<bucket>.<endpoint>/<key>`).
pub struct S3Presigner {
    endpoint: String,
    signer: AwsV4Signer,
    credential: AwsCredential,
    expiry: Duration,
}

impl S3Presigner {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        expiry: Duration,
    ) -> Result<Self, StorageError> {
        if endpoint.is_empty() || endpoint.contains("://") || endpoint.contains('/') {
            return Err(StorageError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self {
            endpoint: endpoint.to_string(),
            signer: AwsV4Signer::new("s3", region),
            credential: AwsCredential {
                access_key_id: access_key.to_string(),
                secret_access_key: secret_key.to_string(),
                session_token: None,
                expires_in: None,
            },
            expiry,
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        Self::new(
            &config.endpoint,
            &config.region,
            &config.access_key,
            &config.secret_key,
            config.url_expiry(),
        )
    }

    /// Presign `method` on `bucket/key`, valid for the configured expiry.
    pub fn presign(&self, method: Method, bucket: &str, key: &str) -> Result<String, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::Signing("empty bucket name".into()));
        }
        let url = Url::parse(&format!(
            "https://{bucket}.{}/{}",
            self.endpoint,
            key.trim_start_matches('/')
        ))
        .map_err(|e| StorageError::InvalidEndpoint(e.to_string()))?;

        let mut req = http::Request::builder()
            .method(method)
            .uri(url.as_str())
            .body(())
            .map_err(|e| StorageError::Signing(e.to_string()))?;
        self.signer
            .sign_query(&mut req, self.expiry, &self.credential)
            .map_err(|e| StorageError::Signing(e.to_string()))?;
        Ok(req.uri().to_string())
    }
}

impl UrlSigner for S3Presigner {
    fn presign_put(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        self.presign(Method::PUT, bucket, key)
    }

    fn presign_get(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        self.presign(Method::GET, bucket, key)
    }
}
