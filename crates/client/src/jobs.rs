//! Job lifecycle client.
//!
//! ## Wire contract (per service root)
//!
//! - `POST   /jobs`              create, returns `{ job: { id } }`
//! - `PATCH  /jobs/{id}`         `{ state: "active" | "cancelled" }`
//! - `GET    /jobs/{id}`         `{ job: { id, state, settings, ... } }`
//! - `GET    /jobs/{id}/progress` `{ progress: { state, percentage, step } }`
//!
//! ## Progress normalization
//!
//! A cancelled job may keep reporting `active` on the progress endpoint, so
//! the job's own `state` is read first and always wins. Settled jobs never
//! reach the progress endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use realitycap_auth::TokenProvider;
use realitycap_core::{Job, JobId, JobState, NewJob, Progress, ProgressState, ServiceKind};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, TransportError};
use crate::transport::Transport;
use crate::wire::{CreatedJobEnvelope, JobEnvelope, ProgressEnvelope, StatePatch, WireProgress};

/// Job lifecycle operations of one service.
///
/// Implemented by [`JobClient`]; callers that dispatch by job type hold
/// `Arc<dyn JobService>` so fakes can stand in for the network.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Service this implementation talks to.
    fn service(&self) -> ServiceKind;

    /// Create and start a job; returns the id assigned by the service.
    async fn submit_job(&self, job: &NewJob) -> ClientResult<JobId>;

    /// Full job snapshot, including settings and outputs.
    async fn get_job_properties(&self, id: &JobId) -> ClientResult<Job>;

    /// Current progress with the job state taking precedence.
    async fn get_job_progress(&self, id: &JobId) -> ClientResult<Progress>;

    /// Request cancellation. Succeeds if the job is already terminal.
    async fn cancel_job(&self, id: &JobId) -> ClientResult<()>;
}

#[derive(Debug, Clone)]
pub struct JobClient {
    service: ServiceKind,
    transport: Transport,
}

impl JobClient {
    pub fn new(
        config: &ClientConfig,
        service: ServiceKind,
        tokens: Arc<dyn TokenProvider>,
    ) -> ClientResult<Self> {
        Ok(Self::with_transport(
            service,
            Transport::new(config, service, tokens)?,
        ))
    }

    pub fn with_transport(service: ServiceKind, transport: Transport) -> Self {
        Self { service, transport }
    }

    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// `POST /jobs`. The job stays unsubmitted until [`JobClient::start_job`].
    pub async fn create_job(&self, job: &NewJob) -> ClientResult<JobId> {
        self.ensure_owns(job)?;
        let created: CreatedJobEnvelope = self.transport.post(&["jobs"], job).await?;
        let id = created.job.id;
        info!(
            service = %self.service,
            job_id = %id,
            job_type = %job.job_type,
            name = %job.name,
            "job created"
        );
        Ok(id)
    }

    /// `PATCH /jobs/{id}` to `active`.
    pub async fn start_job(&self, id: &JobId) -> ClientResult<()> {
        let patch = StatePatch {
            state: JobState::Active,
        };
        self.transport.patch(&["jobs", id.as_str()], &patch).await?;
        info!(service = %self.service, job_id = %id, "job submitted");
        Ok(())
    }

    pub async fn submit_job(&self, job: &NewJob) -> ClientResult<JobId> {
        let id = self.create_job(job).await?;
        if let Err(err) = self.start_job(&id).await {
            warn!(
                service = %self.service,
                job_id = %id,
                error = %err,
                "job created but could not be started"
            );
            return Err(err);
        }
        Ok(id)
    }

    pub async fn get_job_properties(&self, id: &JobId) -> ClientResult<Job> {
        let envelope: JobEnvelope = self.transport.get(&["jobs", id.as_str()]).await?;
        Ok(envelope.job)
    }

    pub async fn get_job_progress(&self, id: &JobId) -> ClientResult<Progress> {
        let job = self.get_job_properties(id).await?;
        if let Some(settled) = Progress::settled(job.state) {
            return Ok(settled);
        }

        let envelope: ProgressEnvelope = self
            .transport
            .get(&["jobs", id.as_str(), "progress"])
            .await?;
        Ok(active_progress(envelope.progress))
    }

    pub async fn cancel_job(&self, id: &JobId) -> ClientResult<()> {
        let patch = StatePatch {
            state: JobState::Cancelled,
        };
        let rejection = match self.transport.patch(&["jobs", id.as_str()], &patch).await {
            Ok(()) => {
                info!(service = %self.service, job_id = %id, "job cancellation requested");
                return Ok(());
            }
            Err(err) if is_rejection(&err) => err,
            Err(err) => return Err(err),
        };

        match self.get_job_properties(id).await {
            Ok(job) if job.state.is_terminal() => {
                warn!(
                    service = %self.service,
                    job_id = %id,
                    state = %job.state,
                    error = %rejection,
                    "cancel rejected for a job that already finished; ignoring"
                );
                Ok(())
            }
            _ => Err(rejection),
        }
    }

    fn ensure_owns(&self, job: &NewJob) -> ClientResult<()> {
        let expected = job.service();
        if expected != self.service {
            return Err(ClientError::WrongService {
                job_type: job.job_type,
                expected,
                actual: self.service,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl JobService for JobClient {
    fn service(&self) -> ServiceKind {
        self.service
    }

    async fn submit_job(&self, job: &NewJob) -> ClientResult<JobId> {
        JobClient::submit_job(self, job).await
    }

    async fn get_job_properties(&self, id: &JobId) -> ClientResult<Job> {
        JobClient::get_job_properties(self, id).await
    }

    async fn get_job_progress(&self, id: &JobId) -> ClientResult<Progress> {
        JobClient::get_job_progress(self, id).await
    }

    async fn cancel_job(&self, id: &JobId) -> ClientResult<()> {
        JobClient::cancel_job(self, id).await
    }
}

/// A 4xx answer, structured or not: the service saw the request and refused it.
fn is_rejection(err: &ClientError) -> bool {
    match err {
        ClientError::Service(_) => true,
        ClientError::Transport(TransportError::Status { status, .. }) => {
            (400..500).contains(status)
        }
        _ => false,
    }
}

/// Map the progress endpoint for a job whose own state is `active`.
///
/// A finished report is trusted and normalized to 100%. A failed or
/// cancelled report is not: the job state is the authority and will say so
/// on the next poll.
fn active_progress(wire: WireProgress) -> Progress {
    match ProgressState::from(wire.state) {
        ProgressState::Done => Progress::done(),
        _ => Progress::new(
            ProgressState::Active,
            wire.percentage,
            wire.step.unwrap_or_default(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(state: JobState, percentage: f64, step: Option<&str>) -> WireProgress {
        WireProgress {
            state,
            percentage,
            step: step.map(str::to_string),
        }
    }

    #[test]
    fn finished_progress_report_is_normalized_to_done() {
        let p = active_progress(wire(JobState::Over, 87.0, Some("Export")));
        assert_eq!(p, Progress::done());
    }

    #[test]
    fn progress_report_cannot_override_active_job_state() {
        let p = active_progress(wire(JobState::Cancelled, 30.0, Some("Tiling")));
        assert_eq!(p.state, ProgressState::Active);
        assert_eq!(p.percentage, 30);
    }

    #[test]
    fn only_4xx_answers_count_as_rejections() {
        let conflict = ClientError::from(TransportError::Status {
            status: 409,
            body: "Conflict".to_string(),
        });
        let outage = ClientError::from(TransportError::Status {
            status: 503,
            body: "Service Unavailable".to_string(),
        });
        assert!(is_rejection(&conflict));
        assert!(!is_rejection(&outage));
        assert!(!is_rejection(&TransportError::Timeout.into()));
    }

    #[test]
    fn out_of_range_percentages_are_clamped() {
        assert_eq!(active_progress(wire(JobState::Active, 140.0, None)).percentage, 100);
        assert_eq!(active_progress(wire(JobState::Active, -3.0, None)).percentage, 0);
    }
}
