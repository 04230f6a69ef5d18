//! `realitycap-core`: domain vocabulary shared by the Reality Capture clients.
//!
//! This crate holds **pure data** (identifiers, job types, lifecycle states,
//! progress snapshots). It performs no I/O.

pub mod error;
pub mod id;
pub mod job;
pub mod progress;
pub mod service_error;
pub mod workspace;

pub use error::{DomainError, DomainResult};
pub use id::{ITwinId, JobId, RealityDataId, WorkspaceId};
pub use job::{Job, JobExecution, JobSpecification, JobState, JobType, NewJob, ServiceKind};
pub use progress::{Progress, ProgressState};
pub use service_error::{ErrorEnvelope, ServiceErrorBody};
pub use workspace::Workspace;
