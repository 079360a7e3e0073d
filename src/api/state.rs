use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::observability::Metrics;
use crate::storage::StorageClient;
use crate::store::PerformanceStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub uploads: StorageClient,
    pub store: Arc<dyn PerformanceStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Arc<Dispatcher>,
        uploads: StorageClient,
        store: Arc<dyn PerformanceStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            uploads,
            store,
            metrics,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.config.server.max_upload_bytes.as_u64()
    }
}
