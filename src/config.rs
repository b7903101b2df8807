//! Service configuration loaded from `bakta-jobs.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Credentials can come from the environment (`S3_ACCESS_KEY`, `S3_SECRET_KEY`,
//! `ORCHESTRATOR_TOKEN`), which takes precedence over the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "bakta-jobs.toml";

/// SigV4 presigned URLs cannot outlive seven days.
const MAX_URL_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Client-facing API.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Status callbacks from running workloads.
    #[serde(default = "default_update_listen_addr")]
    pub update_listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_update_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            update_listen_addr: default_update_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Bearer token. Falls back to `token_file` when empty.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    /// PEM bundle to trust for the API server, in addition to the system roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://kubernetes.default.svc".to_string()
}

fn default_namespace() -> String {
    "bakta".to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token")
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            namespace: default_namespace(),
            token: String::new(),
            token_file: default_token_file(),
            ca_cert: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl OrchestratorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// The workload descriptor template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_cpu")]
    pub cpu_request: String,
    #[serde(default = "default_cpu")]
    pub cpu_limit: String,
    #[serde(default = "default_memory")]
    pub memory_request: String,
    #[serde(default = "default_memory")]
    pub memory_limit: String,
    #[serde(default = "default_backoff_limit")]
    pub backoff_limit: u32,
    /// Garbage-collection delay for finished workloads the monitor missed.
    #[serde(
        default = "default_ttl_seconds_after_finished",
        skip_serializing_if = "Option::is_none"
    )]
    pub ttl_seconds_after_finished: Option<u32>,
    /// Read-only claim holding the annotation database, mounted at `/db`.
    #[serde(default = "default_database_claim")]
    pub database_claim: String,
    /// Secret with `AccessKey`/`SecretKey` for the workload's storage access.
    #[serde(default = "default_storage_secret")]
    pub storage_secret: String,
    #[serde(default = "default_callback_service")]
    pub callback_service: String,
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
    #[serde(default = "default_post_start_command", skip_serializing_if = "Option::is_none")]
    pub post_start_command: Option<String>,
    #[serde(default = "default_threads")]
    pub threads: u32,
}

fn default_image() -> String {
    "ghcr.io/ag-computational-bio/bakta-web-job:latest".to_string()
}

fn default_cpu() -> String {
    "4".to_string()
}

fn default_memory() -> String {
    "4000Mi".to_string()
}

fn default_backoff_limit() -> u32 {
    1
}

fn default_ttl_seconds_after_finished() -> Option<u32> {
    Some(100)
}

fn default_database_claim() -> String {
    "bakta-database".to_string()
}

fn default_storage_secret() -> String {
    "s3".to_string()
}

fn default_callback_service() -> String {
    "bakta-jobs-update".to_string()
}

fn default_callback_port() -> u16 {
    8081
}

fn default_post_start_command() -> Option<String> {
    Some("/bin/DataStager update".to_string())
}

fn default_threads() -> u32 {
    12
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            cpu_request: default_cpu(),
            cpu_limit: default_cpu(),
            memory_request: default_memory(),
            memory_limit: default_memory(),
            backoff_limit: default_backoff_limit(),
            ttl_seconds_after_finished: default_ttl_seconds_after_finished(),
            database_claim: default_database_claim(),
            storage_secret: default_storage_secret(),
            callback_service: default_callback_service(),
            callback_port: default_callback_port(),
            post_start_command: default_post_start_command(),
            threads: default_threads(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Host of the S3-compatible endpoint, without scheme.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_base_key")]
    pub base_key: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_url_expiry_secs")]
    pub url_expiry_secs: u64,
}

fn default_endpoint() -> String {
    "s3.amazonaws.com".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket() -> String {
    "bakta".to_string()
}

fn default_base_key() -> String {
    "jobs".to_string()
}

fn default_url_expiry_secs() -> u64 {
    MAX_URL_EXPIRY_SECS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            region: default_region(),
            bucket: default_bucket(),
            base_key: default_base_key(),
            access_key: String::new(),
            secret_key: String::new(),
            url_expiry_secs: default_url_expiry_secs(),
        }
    }
}

impl StorageConfig {
    pub fn url_expiry(&self) -> Duration {
        Duration::from_secs(self.url_expiry_secs)
    }
}

/// Status resolution after a push or callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Wait before reading counts, letting the orchestrator settle.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_monitor_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_polls() -> u32 {
    20
}

fn default_max_concurrent() -> usize {
    16
}

fn default_monitor_queue_capacity() -> usize {
    1024
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            max_polls: default_max_polls(),
            max_concurrent: default_max_concurrent(),
            queue_capacity: default_monitor_queue_capacity(),
        }
    }
}

impl MonitorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_reconciler_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_interval_secs() -> u64 {
    600
}

fn default_workers() -> usize {
    100
}

fn default_reconciler_queue_capacity() -> usize {
    500
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            workers: default_workers(),
            queue_capacity: default_reconciler_queue_capacity(),
        }
    }
}

impl ReconcilerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Job bookkeeping and what `/api/v1/version` reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Run against the mock annotation database.
    #[serde(default)]
    pub testing: bool,
    #[serde(default = "default_unknown")]
    pub tool_version: String,
    #[serde(default = "default_unknown")]
    pub db_version: String,
}

fn default_retention_days() -> i64 {
    10
}

fn default_unknown() -> String {
    "unknown".to_string()
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            testing: false,
            tool_version: default_unknown(),
            db_version: default_unknown(),
        }
    }
}

impl AppConfig {
    /// Load `path`, apply environment overrides and fill in the orchestrator
    /// token from its token file if still empty. A missing file yields the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<AppConfig>(&contents)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());

        if config.orchestrator.token.is_empty() && config.orchestrator.token_file.exists() {
            let token = std::fs::read_to_string(&config.orchestrator.token_file)?;
            config.orchestrator.token = token.trim().to_string();
        }

        Ok(config)
    }

    /// Environment values take precedence over the file. Empty values are
    /// ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };
        set(&mut self.storage.access_key, "S3_ACCESS_KEY");
        set(&mut self.storage.secret_key, "S3_SECRET_KEY");
        set(&mut self.orchestrator.token, "ORCHESTRATOR_TOKEN");
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.access_key.is_empty() {
            return Err(ConfigError::Missing("storage.access_key"));
        }
        if self.storage.secret_key.is_empty() {
            return Err(ConfigError::Missing("storage.secret_key"));
        }
        if self.orchestrator.token.is_empty() {
            return Err(ConfigError::Missing("orchestrator.token"));
        }
        if self.workload.image.is_empty() {
            return Err(ConfigError::Missing("workload.image"));
        }
        if self.workload.database_claim.is_empty() {
            return Err(ConfigError::Missing("workload.database_claim"));
        }
        if self.storage.url_expiry_secs == 0 || self.storage.url_expiry_secs > MAX_URL_EXPIRY_SECS
        {
            return Err(ConfigError::Invalid {
                field: "storage.url_expiry_secs",
                reason: format!("must be between 1 and {MAX_URL_EXPIRY_SECS}"),
            });
        }
        if self.reconciler.workers == 0 || self.reconciler.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "reconciler",
                reason: "workers and queue_capacity must be positive".into(),
            });
        }
        if self.monitor.max_concurrent == 0 || self.monitor.max_polls == 0 {
            return Err(ConfigError::Invalid {
                field: "monitor",
                reason: "max_concurrent and max_polls must be positive".into(),
            });
        }
        if self.jobs.retention_days <= 0 {
            return Err(ConfigError::Invalid {
                field: "jobs.retention_days",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// A copy safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for secret in [
            &mut copy.storage.access_key,
            &mut copy.storage.secret_key,
            &mut copy.orchestrator.token,
        ] {
            if !secret.is_empty() {
                *secret = REDACTED.to_string();
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.access_key = "access".into();
        config.storage.secret_key = "secret".into();
        config.orchestrator.token = "token".into();
        config
    }

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.orchestrator.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.orchestrator.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.workload.cpu_limit, "4");
        assert_eq!(config.workload.memory_request, "4000Mi");
        assert_eq!(config.workload.backoff_limit, 1);
        assert_eq!(config.workload.storage_secret, "s3");
        assert_eq!(config.workload.threads, 12);
        assert_eq!(config.workload.ttl_seconds_after_finished, Some(100));
        assert_eq!(config.monitor.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.monitor.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.monitor.max_polls, 20);
        assert_eq!(config.reconciler.workers, 100);
        assert_eq!(config.reconciler.queue_capacity, 500);
        assert_eq!(config.jobs.retention_days, 10);
        assert!(!config.jobs.testing);
        assert!(config.storage.access_key.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            [orchestrator]
            namespace = "annotation"

            [storage]
            bucket = "uploads"

            [jobs]
            testing = true
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.orchestrator.namespace, "annotation");
        assert_eq!(config.orchestrator.api_url, "https://kubernetes.default.svc");
        assert_eq!(config.storage.bucket, "uploads");
        assert_eq!(config.storage.region, "us-east-1");
        assert!(config.jobs.testing);
        assert_eq!(config.monitor, MonitorConfig::default());
    }

    #[test]
    fn load_reads_file_and_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token");
        std::fs::write(&token_path, "from-file\n").unwrap();

        let config_path = dir.path().join("bakta-jobs.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            "[orchestrator]\ntoken_file = {:?}\n\n[reconciler]\nworkers = 7",
            token_path.display().to_string()
        )
        .unwrap();

        let config = AppConfig::load(&config_path).unwrap();
        assert_eq!(config.reconciler.workers, 7);
        // ORCHESTRATOR_TOKEN is not expected in the test environment
        if std::env::var("ORCHESTRATOR_TOKEN").is_err() {
            assert_eq!(config.orchestrator.token, "from-file");
        }
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.reconciler.workers, 100);
    }

    #[test]
    fn load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nlisten_addr = 1").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn env_takes_precedence() {
        let env: HashMap<&str, &str> = [
            ("S3_ACCESS_KEY", "env-access"),
            ("S3_SECRET_KEY", ""),
            ("ORCHESTRATOR_TOKEN", "env-token"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.storage.secret_key = "file-secret".into();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage.access_key, "env-access");
        assert_eq!(config.storage.secret_key, "file-secret");
        assert_eq!(config.orchestrator.token, "env-token");
    }

    #[test]
    fn validate_requires_credentials() {
        assert!(valid_config().validate().is_ok());

        let mut config = valid_config();
        config.storage.access_key.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("storage.access_key"))
        ));

        let mut config = valid_config();
        config.orchestrator.token.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("orchestrator.token"))
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = valid_config();
        config.storage.url_expiry_secs = MAX_URL_EXPIRY_SECS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "storage.url_expiry_secs",
                ..
            })
        ));

        let mut config = valid_config();
        config.reconciler.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn redacted_hides_secrets() {
        let redacted = valid_config().redacted();
        assert_eq!(redacted.storage.access_key, REDACTED);
        assert_eq!(redacted.storage.secret_key, REDACTED);
        assert_eq!(redacted.orchestrator.token, REDACTED);
        assert!(toml::to_string_pretty(&redacted).unwrap().contains(REDACTED));
    }
}
