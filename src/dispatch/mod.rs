//! Dispatch: turns requests into jobs and runs them on a worker pool
//! without blocking the caller.

mod broker;
mod sweeper;
mod worker;

pub use broker::{Dispatcher, JobEnvelope, JobQueue};
pub use sweeper::spawn_retention_sweep;
pub use worker::spawn_workers;

use thiserror::Error;

use crate::jobs::RegistryError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatch queue is full, job {0} rejected")]
    QueueFull(String),

    #[error("No worker available, job {0} rejected")]
    WorkersUnavailable(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
