//! Job tracking: record model, lifecycle rules and the shared registry

mod models;
mod registry;

pub use models::{JobKind, JobMetadata, JobRecord, JobStatus, JobUpdate, generate_job_id};
pub use registry::{JobRegistry, RegistryError};
