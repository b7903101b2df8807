use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bakta_jobs::api;
use bakta_jobs::cli::{Cli, Command};
use bakta_jobs::config::AppConfig;
use bakta_jobs::monitor::StatusMonitor;
use bakta_jobs::orchestrator::{KubeClient, WorkloadApi};
use bakta_jobs::reconciler::StragglerReconciler;
use bakta_jobs::scheduler::Scheduler;
use bakta_jobs::service::{JobService, ServiceSettings};
use bakta_jobs::shutdown::install_shutdown_handler;
use bakta_jobs::spec_builder::JobSpecBuilder;
use bakta_jobs::storage::S3Presigner;
use bakta_jobs::store::{JobStore, MemoryJobStore};
use bakta_jobs::tasks::TaskQueue;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate().context("invalid configuration")?;

    match cli.command {
        Command::CheckConfig => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("rendering configuration")?;
            println!("{rendered}");
            Ok(())
        }
        Command::Serve => serve(config).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let ca_pem = match &config.orchestrator.ca_cert {
        Some(path) => Some(
            std::fs::read(path)
                .with_context(|| format!("reading CA bundle {}", path.display()))?,
        ),
        None => None,
    };
    let api: Arc<dyn WorkloadApi> = Arc::new(
        KubeClient::new(&config.orchestrator, ca_pem.as_deref())
            .context("building orchestrator client")?,
    );
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let signer = Arc::new(S3Presigner::from_config(&config.storage).context("storage signer")?);

    let specs = JobSpecBuilder::new(
        config.storage.endpoint.clone(),
        config.workload.threads,
        config.jobs.testing,
    );
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        api.clone(),
        specs,
        config.workload.clone(),
    ));
    let monitor = Arc::new(StatusMonitor::new(
        store.clone(),
        api.clone(),
        scheduler.clone(),
        config.monitor.clone(),
    ));
    let tasks = Arc::new(TaskQueue::new(
        config.monitor.max_concurrent,
        config.monitor.queue_capacity,
    ));
    let service = Arc::new(JobService::new(
        store.clone(),
        signer,
        scheduler,
        monitor,
        tasks.clone(),
        ServiceSettings {
            bucket: config.storage.bucket.clone(),
            base_key: config.storage.base_key.clone(),
            retention: chrono::Duration::days(config.jobs.retention_days),
            tool_version: config.jobs.tool_version.clone(),
            db_version: config.jobs.db_version.clone(),
        },
    ));
    let reconciler = StragglerReconciler::new(store, api, config.reconciler.clone());

    let shutdown = install_shutdown_handler();
    tracing::info!(
        namespace = %config.orchestrator.namespace,
        testing = config.jobs.testing,
        "starting bakta job service"
    );

    let reconcile = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { reconciler.run(shutdown).await }
    });
    let updates = tokio::spawn(api::serve(
        config.server.update_listen_addr,
        api::update_router(service.clone()),
        shutdown.clone(),
    ));

    let served = api::serve(
        config.server.listen_addr,
        api::router(service),
        shutdown.clone(),
    )
    .await;
    if let Err(e) = &served {
        tracing::error!(addr = %config.server.listen_addr, error = %e, "API listener failed");
    }
    shutdown.cancel();

    match updates.await {
        Ok(Err(e)) => {
            tracing::error!(addr = %config.server.update_listen_addr, error = %e, "callback listener failed")
        }
        Err(e) => tracing::error!(error = %e, "callback listener panicked"),
        Ok(Ok(())) => {}
    }
    if let Err(e) = reconcile.await {
        tracing::error!(error = %e, "reconciler panicked");
    }
    tasks.shutdown().await;

    served.context("serving API")
}
