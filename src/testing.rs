//! In-memory fakes for the orchestrator and object storage.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::orchestrator::{
    OrchestratorError, WorkloadApi, Workload, WorkloadCounts, WorkloadManifest,
};
use crate::storage::{StorageError, UrlSigner};

#[derive(Default)]
pub struct FakeWorkloadApi {
    workloads: Mutex<HashMap<String, Workload>>,
    pub created: Mutex<Vec<WorkloadManifest>>,
    pub deleted: Mutex<Vec<String>>,
    pub pod_message: Mutex<Option<String>>,
    pub logs: Mutex<Option<String>>,
    /// Counts handed out by successive `get_workload` calls, one per call.
    script: Mutex<VecDeque<WorkloadCounts>>,
    pub fail_create: AtomicBool,
    pub fail_get: AtomicBool,
    pub gets: AtomicUsize,
}

impl FakeWorkloadApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: &str, counts: WorkloadCounts) {
        self.workloads.lock().unwrap().insert(
            name.to_string(),
            Workload {
                name: name.to_string(),
                uid: format!("uid-{name}"),
                counts,
            },
        );
    }

    /// Drop a workload without recording a delete call.
    pub fn remove(&self, name: &str) {
        self.workloads.lock().unwrap().remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workloads.lock().unwrap().contains_key(name)
    }

    /// Make the next `get_workload` calls report `counts` in order.
    pub fn script(&self, counts: impl IntoIterator<Item = WorkloadCounts>) {
        self.script.lock().unwrap().extend(counts);
    }
}

#[async_trait]
impl WorkloadApi for FakeWorkloadApi {
    async fn create_workload(
        &self,
        manifest: &WorkloadManifest,
    ) -> Result<Workload, OrchestratorError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Api {
                status: 500,
                message: "create failed".into(),
            });
        }
        let name = &manifest.metadata.name;
        if self.contains(name) {
            return Err(OrchestratorError::AlreadyExists(name.clone()));
        }
        self.put(name, WorkloadCounts::default());
        self.created.lock().unwrap().push(manifest.clone());
        Ok(self.workloads.lock().unwrap()[name.as_str()].clone())
    }

    async fn get_workload(&self, name: &str) -> Result<Workload, OrchestratorError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Api {
                status: 500,
                message: "get failed".into(),
            });
        }
        let mut workloads = self.workloads.lock().unwrap();
        let workload = workloads
            .get_mut(name)
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))?;
        if let Some(counts) = self.script.lock().unwrap().pop_front() {
            workload.counts = counts;
        }
        Ok(workload.clone())
    }

    async fn delete_workload(&self, name: &str) -> Result<(), OrchestratorError> {
        self.deleted.lock().unwrap().push(name.to_string());
        self.workloads
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))
    }

    async fn latest_pod_message(&self, workload: &str) -> Result<String, OrchestratorError> {
        self.pod_message
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| OrchestratorError::NoPods(workload.to_string()))
    }

    async fn workload_logs(&self, workload: &str) -> Result<String, OrchestratorError> {
        if !self.contains(workload) {
            return Err(OrchestratorError::NotFound(workload.to_string()));
        }
        self.logs
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| OrchestratorError::NoPods(workload.to_string()))
    }
}

pub struct FakeSigner;

impl UrlSigner for FakeSigner {
    fn presign_put(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        Ok(format!("https://signed.test/put/{bucket}/{key}"))
    }

    fn presign_get(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        Ok(format!("https://signed.test/get/{bucket}/{key}"))
    }
}
