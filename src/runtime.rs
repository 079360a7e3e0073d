//! Wires configuration into running components: report client, storage,
//! pipeline, dispatcher and worker pool. Shared by the server and the
//! one-shot CLI commands.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ads::{AdsError, ReportClient, ReportSource};
use crate::api::AppState;
use crate::config::{Config, PerformanceBackend, UploadBackend};
use crate::dispatch::{Dispatcher, spawn_retention_sweep, spawn_workers};
use crate::jobs::{JobRecord, JobRegistry};
use crate::observability::Metrics;
use crate::pipeline::IngestionPipeline;
use crate::storage::{StorageClient, StorageError};
use crate::store::{FjallPerformanceStore, MemoryPerformanceStore, PerformanceStore, StoreError};

/// How long shutdown waits for in-flight jobs before aborting workers
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to build report client: {0}")]
    Ads(#[from] AdsError),

    #[error("Failed to open upload storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to open performance store: {0}")]
    Store(#[from] StoreError),
}

pub struct Runtime {
    config: Arc<Config>,
    registry: Arc<JobRegistry>,
    dispatcher: Arc<Dispatcher>,
    uploads: StorageClient,
    store: Arc<dyn PerformanceStore>,
    metrics: Arc<Metrics>,
    workers: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Open the configured backends and start the worker pool.
    /// Must be called from within a tokio runtime.
    pub fn start(config: Config) -> Result<Self, RuntimeError> {
        let reports = ReportClient::new(config.ads_client(), config.ads.credentials.clone())?;
        if config.ads.credentials.is_none() {
            warn!("Ads API credentials are not configured, fetch jobs will fail");
        }

        let uploads = match config.storage.uploads {
            UploadBackend::Memory => StorageClient::in_memory(),
            UploadBackend::Local => StorageClient::local(&config.storage.uploads_dir)?,
        };

        let store: Arc<dyn PerformanceStore> = match config.storage.performance {
            PerformanceBackend::Memory => Arc::new(MemoryPerformanceStore::new()),
            PerformanceBackend::Fjall => {
                info!(path = %config.storage.performance_path.display(), "Opening performance store");
                Arc::new(FjallPerformanceStore::open(&config.storage.performance_path)?)
            }
        };

        Ok(Self::with_components(
            config,
            Arc::new(reports),
            uploads,
            store,
        ))
    }

    /// Start the worker pool over caller-provided components
    pub fn with_components(
        config: Config,
        reports: Arc<dyn ReportSource>,
        uploads: StorageClient,
        store: Arc<dyn PerformanceStore>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(JobRegistry::new());
        let metrics = Arc::new(Metrics::new());

        let pipeline = Arc::new(IngestionPipeline::new(
            registry.clone(),
            reports,
            uploads.clone(),
            store.clone(),
            metrics.clone(),
            config.pipeline_settings(),
        ));

        let (dispatcher, queue) = Dispatcher::new(
            registry.clone(),
            metrics.clone(),
            config.workers.count,
            config.workers.queue_size,
        );
        let workers = spawn_workers(queue, config.workers.count, pipeline);

        info!(
            workers = workers.len(),
            uploads = uploads.backend(),
            store = store.backend(),
            "Runtime started"
        );

        Self {
            config,
            registry,
            dispatcher: Arc::new(dispatcher),
            uploads,
            store,
            metrics,
            workers,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn uploads(&self) -> &StorageClient {
        &self.uploads
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.config.clone(),
            self.dispatcher.clone(),
            self.uploads.clone(),
            self.store.clone(),
            self.metrics.clone(),
        )
    }

    /// Periodic registry cleanup per the retention settings
    pub fn spawn_retention_sweep(&self) -> JoinHandle<()> {
        spawn_retention_sweep(
            self.registry.clone(),
            self.config.retention.keep_last_n,
            self.config.sweep_interval(),
        )
    }

    /// Poll the registry until the job reaches a terminal state.
    /// Returns `None` if the job is unknown or was removed meanwhile.
    pub async fn wait_for(&self, job_id: &str, poll: Duration) -> Option<JobRecord> {
        loop {
            let job = self.dispatcher.status(job_id).await?;
            if job.status.is_terminal() {
                return Some(job);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Close the work queue and wait for in-flight jobs to finish
    pub async fn shutdown(self) {
        let Runtime {
            dispatcher,
            mut workers,
            ..
        } = self;
        drop(dispatcher);

        for handle in workers.iter_mut() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut *handle).await.is_err() {
                warn!("Worker did not stop in time, aborting");
                handle.abort();
            }
        }
        info!("Runtime stopped");
    }
}
