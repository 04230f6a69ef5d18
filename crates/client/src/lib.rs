//! `realitycap-client`: job lifecycle client for the Reality Capture services.
//!
//! - [`JobClient`] submits jobs, reads their properties and progress, and
//!   cancels them. One client talks to one service.
//! - [`ServiceRegistry`] routes a job to the client of the service that owns
//!   its type.
//! - [`poll`] holds the caller-side loop that waits for a terminal state.
//!
//! The clients never retry and never sleep; each call issues its requests and
//! returns a typed result.

pub mod config;
pub mod error;
pub mod jobs;
pub mod poll;
pub mod registry;
pub mod transport;
pub mod workspace;

mod wire;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, ServiceError, TransportError};
pub use jobs::{JobClient, JobService};
pub use poll::{BackoffStrategy, PollError, PollOptions, RetryPolicy, poll_until, wait_for_terminal};
pub use registry::ServiceRegistry;
pub use transport::Transport;
pub use workspace::WorkspaceClient;
