//! Command-line job runner: submit one job, follow it to the end.
//!
//! Configuration is read from the environment:
//!
//! - `REALITYCAP_TOKEN` (required) bearer token
//! - `REALITYCAP_BASE_URL` / `IMJS_URL_PREFIX` service location
//! - `REALITYCAP_POLL_SECS` poll interval, default 6
//! - `REALITYCAP_POLL_TIMEOUT_SECS` optional overall deadline

use std::future::Future;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{info, warn};

use realitycap_client::{ClientConfig, PollOptions, ServiceRegistry, wait_for_terminal};
use realitycap_core::{Job, JobId, NewJob, ProgressState};

pub const ENV_TOKEN: &str = "REALITYCAP_TOKEN";
pub const ENV_POLL_SECS: &str = "REALITYCAP_POLL_SECS";
pub const ENV_POLL_TIMEOUT_SECS: &str = "REALITYCAP_POLL_TIMEOUT_SECS";

const DEFAULT_POLL_SECS: u64 = 6;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub token: String,
    pub client: ClientConfig,
    pub poll: PollOptions,
}

impl RunnerSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let token = lookup(ENV_TOKEN)
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("{ENV_TOKEN} is not set"))?;

        let client = ClientConfig::from_lookup(&lookup).context("invalid service configuration")?;

        let interval = match lookup(ENV_POLL_SECS) {
            Some(raw) => seconds(ENV_POLL_SECS, &raw)?,
            None => Duration::from_secs(DEFAULT_POLL_SECS),
        };
        if interval.is_zero() {
            bail!("{ENV_POLL_SECS} must be at least 1");
        }

        let mut poll = PollOptions::default().with_interval(interval);
        if let Some(raw) = lookup(ENV_POLL_TIMEOUT_SECS) {
            poll = poll.with_timeout(seconds(ENV_POLL_TIMEOUT_SECS, &raw)?);
        }

        Ok(Self { token, client, poll })
    }
}

fn seconds(key: &str, raw: &str) -> anyhow::Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of seconds, got {raw:?}"))?;
    Ok(Duration::from_secs(secs))
}

/// Read a job description (the JSON body of a create request).
pub fn read_job(path: impl AsRef<Path>) -> anyhow::Result<NewJob> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read job file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid job file {}", path.display()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded(Job),
    Failed(Job),
    Cancelled(Job),
    /// The run was interrupted and a cancellation was requested.
    Interrupted(JobId),
}

impl Outcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Outcome::Succeeded(_) => ExitCode::SUCCESS,
            Outcome::Failed(_) => ExitCode::from(2),
            Outcome::Cancelled(_) => ExitCode::from(3),
            Outcome::Interrupted(_) => ExitCode::from(130),
        }
    }
}

/// Submit `job` and wait for it, cancelling it if `interrupt` resolves first.
pub async fn run(
    registry: &ServiceRegistry,
    job: &NewJob,
    poll: &PollOptions,
    interrupt: impl Future<Output = ()>,
) -> anyhow::Result<Outcome> {
    let service = registry.for_job_type(job.job_type)?;
    let id = service
        .submit_job(job)
        .await
        .with_context(|| format!("failed to submit job {:?}", job.name))?;
    info!(job_id = %id, service = %service.service(), "job submitted");

    let wait = wait_for_terminal(&**service, &id, poll, |p| {
        info!(
            job_id = %id,
            state = %p.state,
            percentage = p.percentage,
            step = %p.step,
            "progress"
        );
    });

    let progress = tokio::select! {
        result = wait => result.with_context(|| format!("lost track of job {id}"))?,
        _ = interrupt => {
            warn!(job_id = %id, "interrupted; cancelling job");
            service
                .cancel_job(&id)
                .await
                .with_context(|| format!("failed to cancel job {id}"))?;
            return Ok(Outcome::Interrupted(id));
        }
    };

    let details = service
        .get_job_properties(&id)
        .await
        .with_context(|| format!("failed to fetch job {id}"))?;
    Ok(match progress.state {
        ProgressState::Done => Outcome::Succeeded(details),
        ProgressState::Cancelled => Outcome::Cancelled(details),
        _ => Outcome::Failed(details),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use realitycap_client::{ClientResult, JobService};
    use realitycap_core::{ITwinId, JobState, JobType, Progress, ServiceKind};

    struct FakeService {
        script: Mutex<VecDeque<Progress>>,
        finished_as: JobState,
        cancelled: AtomicBool,
    }

    impl FakeService {
        fn new(script: Vec<Progress>, finished_as: JobState) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                finished_as,
                cancelled: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl JobService for FakeService {
        fn service(&self) -> ServiceKind {
            ServiceKind::ContextCapture
        }

        async fn submit_job(&self, _job: &NewJob) -> ClientResult<JobId> {
            Ok(JobId::new("job-1"))
        }

        async fn get_job_properties(&self, id: &JobId) -> ClientResult<Job> {
            Ok(serde_json::from_value(serde_json::json!({
                "id": id,
                "type": "Reconstruction",
                "iTwinId": "itwin-1",
                "state": self.finished_as.as_str(),
                "specification": { "outputs": { "exports": [{ "location": "rd-out" }] } }
            }))
            .unwrap())
        }

        async fn get_job_progress(&self, _id: &JobId) -> ClientResult<Progress> {
            let mut script = self.script.lock().unwrap();
            Ok(match script.len() {
                0 => Progress::new(ProgressState::Active, 10.0, "Production"),
                1 => script[0].clone(),
                _ => script.pop_front().unwrap(),
            })
        }

        async fn cancel_job(&self, _id: &JobId) -> ClientResult<()> {
            self.cancelled.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn registry(service: Arc<FakeService>) -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        registry.register(service);
        registry
    }

    fn job() -> NewJob {
        NewJob::new("recon", ITwinId::new("itwin-1"), JobType::Reconstruction)
    }

    fn settings(vars: &[(&str, &str)]) -> anyhow::Result<RunnerSettings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunnerSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn settings_defaults() {
        let settings = settings(&[(ENV_TOKEN, "abc")]).unwrap();
        assert_eq!(settings.token, "abc");
        assert_eq!(settings.poll.interval, Duration::from_secs(6));
        assert_eq!(settings.poll.timeout, None);
        assert_eq!(settings.client.base_url, "https://api.bentley.com");
    }

    #[test]
    fn settings_overrides() {
        let settings = settings(&[
            (ENV_TOKEN, "abc"),
            (ENV_POLL_SECS, "2"),
            (ENV_POLL_TIMEOUT_SECS, "600"),
            ("REALITYCAP_BASE_URL", "http://localhost:9000"),
        ])
        .unwrap();
        assert_eq!(settings.poll.interval, Duration::from_secs(2));
        assert_eq!(settings.poll.timeout, Some(Duration::from_secs(600)));
        assert_eq!(settings.client.base_url, "http://localhost:9000");
    }

    #[test]
    fn settings_reject_bad_values() {
        assert!(settings(&[]).is_err());
        assert!(settings(&[(ENV_TOKEN, "  ")]).is_err());
        assert!(settings(&[(ENV_TOKEN, "abc"), (ENV_POLL_SECS, "0")]).is_err());
        assert!(settings(&[(ENV_TOKEN, "abc"), (ENV_POLL_SECS, "soon")]).is_err());
    }

    #[test]
    fn job_file_is_a_create_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(
            &path,
            r#"{
                "name": "Tiles",
                "type": "Reconstruction",
                "iTwinId": "itwin-1",
                "specification": { "inputs": { "scene": "cs-1" } }
            }"#,
        )
        .unwrap();

        let job = read_job(&path).unwrap();
        assert_eq!(job.job_type, JobType::Reconstruction);
        assert_eq!(job.specification.inputs["scene"], "cs-1");

        std::fs::write(&path, "{").unwrap();
        assert!(read_job(&path).is_err());
        assert!(read_job(dir.path().join("missing.json")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_run_returns_outputs() {
        let service = FakeService::new(
            vec![
                Progress::new(ProgressState::Active, 40.0, "Production"),
                Progress::done(),
            ],
            JobState::Success,
        );
        let outcome = run(
            &registry(service),
            &job(),
            &PollOptions::default(),
            std::future::pending(),
        )
        .await
        .unwrap();

        let Outcome::Succeeded(job) = &outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(job.outputs()["exports"][0]["location"], "rd-out");
        assert_eq!(outcome.exit_code(), ExitCode::SUCCESS);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_is_an_outcome_not_an_error() {
        let service = FakeService::new(vec![Progress::failed()], JobState::Failed);
        let outcome = run(
            &registry(service),
            &job(),
            &PollOptions::default(),
            std::future::pending(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_ne!(outcome.exit_code(), ExitCode::SUCCESS);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_cancels_the_job() {
        let service = FakeService::new(Vec::new(), JobState::Cancelled);
        let outcome = run(
            &registry(service.clone()),
            &job(),
            &PollOptions::default(),
            tokio::time::sleep(Duration::from_secs(15)),
        )
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::Interrupted(JobId::new("job-1")));
        assert!(service.cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unregistered_service_is_an_error() {
        let job = NewJob::new("las", ITwinId::new("itwin-1"), JobType::Conversion);
        let err = run(
            &ServiceRegistry::new(),
            &job,
            &PollOptions::default(),
            std::future::pending(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("RealityConversion"));
    }
}
