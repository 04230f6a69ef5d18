//! Caller-side polling.
//!
//! The clients expose single-shot calls; this module is the one place that
//! sleeps between them. Cadence, deadline and tolerance to transport
//! failures are all chosen by the caller through [`PollOptions`].

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use realitycap_core::{JobId, Progress, ProgressState};

use crate::error::{ClientError, ClientResult};
use crate::jobs::JobService;

/// Backoff strategy for transport retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Same delay every time
    Fixed,
    /// base * attempt
    Linear,
    /// base * 2^(attempt - 1)
    #[default]
    Exponential,
}

/// How many consecutive transport failures a poll loop tolerates, and how
/// long it waits after each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum consecutive retries (0 = fail on the first transport error)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    /// `failures` is the number of consecutive failures seen so far.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Delay between two successful polls.
    pub interval: Duration,
    /// Give up once this much time has passed. `None` polls forever.
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6),
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl PollOptions {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("polling timed out after {elapsed:?}")]
    TimedOut { elapsed: Duration },
}

/// Call `fetch` until `is_done` accepts its result.
///
/// Service errors end the loop at once. Transport errors are retried with
/// backoff while `options.retry` allows; a success resets the count. With a
/// timeout set, a request still in flight at the deadline is abandoned.
pub async fn poll_until<T, F, Fut, P>(
    mut fetch: F,
    mut is_done: P,
    options: &PollOptions,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
    P: FnMut(&T) -> bool,
{
    let started = Instant::now();
    // A deadline too far out to represent is no deadline.
    let deadline = options.timeout.and_then(|limit| started.checked_add(limit));
    let mut failures = 0u32;

    loop {
        let attempt = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, fetch()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(PollError::TimedOut {
                        elapsed: started.elapsed(),
                    });
                }
            },
            None => fetch().await,
        };

        let delay = match attempt {
            Ok(value) => {
                failures = 0;
                if is_done(&value) {
                    return Ok(value);
                }
                options.interval
            }
            Err(err) if err.is_retriable() && options.retry.should_retry(failures) => {
                failures += 1;
                let delay = options.retry.delay_for_attempt(failures);
                warn!(error = %err, attempt = failures, ?delay, "poll failed; retrying");
                delay
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(limit) = options.timeout {
            let elapsed = started.elapsed();
            if elapsed.saturating_add(delay) > limit {
                return Err(PollError::TimedOut { elapsed });
            }
        }
        tokio::time::sleep(delay).await;
    }
}

/// Poll a job's progress until it is done, failed or cancelled.
///
/// Failed and cancelled jobs are returned as `Ok`; they are workflow
/// outcomes, not errors. `on_progress` sees every snapshot, including the
/// last one. A snapshot that contradicts the job lifecycle (a running job
/// reported as pending again) is logged and passed on unchanged.
pub async fn wait_for_terminal<S, F>(
    service: &S,
    id: &JobId,
    options: &PollOptions,
    mut on_progress: F,
) -> Result<Progress, PollError>
where
    S: JobService + ?Sized,
    F: FnMut(&Progress),
{
    let mut previous: Option<ProgressState> = None;
    let progress = poll_until(
        || service.get_job_progress(id),
        |p: &Progress| {
            debug!(
                job_id = %id,
                state = %p.state,
                percentage = p.percentage,
                step = %p.step,
                "job progress"
            );
            if let Some(Err(err)) = previous.map(|prev| prev.transition_to(p.state)) {
                warn!(job_id = %id, error = %err, "job state went backwards");
            }
            previous = Some(p.state);
            on_progress(p);
            p.is_terminal()
        },
        options,
    )
    .await?;

    match progress.state {
        ProgressState::Done => info!(job_id = %id, "job finished"),
        state => warn!(job_id = %id, %state, "job did not finish"),
    }
    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use realitycap_core::{Job, NewJob, ServiceErrorBody, ServiceKind};

    use crate::error::{ServiceError, TransportError};

    /// Replays a fixed sequence of snapshots, repeating the last one.
    struct ScriptedJob {
        script: Mutex<Vec<Progress>>,
    }

    impl ScriptedJob {
        fn new(script: Vec<Progress>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl JobService for ScriptedJob {
        fn service(&self) -> ServiceKind {
            ServiceKind::ContextCapture
        }

        async fn submit_job(&self, _job: &NewJob) -> ClientResult<JobId> {
            unreachable!("not used by these tests")
        }

        async fn get_job_properties(&self, _id: &JobId) -> ClientResult<Job> {
            unreachable!("not used by these tests")
        }

        async fn get_job_progress(&self, _id: &JobId) -> ClientResult<Progress> {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.remove(0))
            } else {
                Ok(script[0].clone())
            }
        }

        async fn cancel_job(&self, _id: &JobId) -> ClientResult<()> {
            Ok(())
        }
    }

    fn options() -> PollOptions {
        PollOptions::default()
            .with_interval(Duration::from_secs(6))
            .with_retry(RetryPolicy::fixed(2, Duration::from_secs(1)))
    }

    fn network() -> ClientError {
        TransportError::Network("connection reset".to_string()).into()
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy =
            RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_millis(500));
    }

    #[test]
    fn linear_and_fixed_backoff() {
        let linear = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
        };
        assert_eq!(linear.delay_for_attempt(3), Duration::from_millis(300));

        let fixed = RetryPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(fixed.delay_for_attempt(1), fixed.delay_for_attempt(3));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::fixed(2, Duration::from_secs(1));
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::no_retry().should_retry(0));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_predicate_holds() {
        let calls = AtomicU32::new(0);
        let value = poll_until(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok::<_, ClientError>(n) }
            },
            |n| *n == 3,
            &options(),
        )
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried_then_reset() {
        // fail, fail, ok, fail, fail, ok(done): never more than two in a row.
        let script = Mutex::new(vec![
            Err(network()),
            Err(network()),
            Ok(false),
            Err(network()),
            Err(network()),
            Ok(true),
        ]);
        let done = poll_until(
            || {
                let next = script.lock().unwrap().remove(0);
                async move { next }
            },
            |done| *done,
            &options(),
        )
        .await
        .unwrap();
        assert!(done);
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_transport_errors_surface() {
        let err = poll_until(
            || async move { Err::<bool, _>(network()) },
            |done| *done,
            &options(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, PollError::Client(network()));
    }

    #[tokio::test(start_paused = true)]
    async fn service_errors_are_never_retried() {
        let calls = AtomicU32::new(0);
        let rejection: ClientError = ServiceError {
            status: 404,
            body: ServiceErrorBody::new("JobNotFound", "no such job"),
        }
        .into();
        let err = poll_until(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                let rejection = rejection.clone();
                async move { Err::<bool, _>(rejection) }
            },
            |done| *done,
            &options(),
        )
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, PollError::Client(ClientError::Service(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_the_loop() {
        let options = options().with_timeout(Duration::from_secs(20));
        let calls = AtomicU32::new(0);
        let err = poll_until(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, ClientError>(false) }
            },
            |done| *done,
            &options,
        )
        .await
        .unwrap_err();
        // Polls at 0s, 6s, 12s, 18s; a fifth poll would land past 20s.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err, PollError::TimedOut { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_abandons_a_hung_request() {
        let options = options().with_timeout(Duration::from_secs(20));
        let started = Instant::now();
        let err = poll_until(
            || std::future::pending::<ClientResult<bool>>(),
            |done| *done,
            &options,
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            PollError::TimedOut {
                elapsed: Duration::from_secs(20)
            }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_intervals_do_not_overflow_the_deadline() {
        let options = PollOptions::default()
            .with_interval(Duration::MAX)
            .with_timeout(Duration::from_secs(20));
        let err = poll_until(
            || async { Ok::<_, ClientError>(false) },
            |done| *done,
            &options,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PollError::TimedOut { .. }));

        let options = PollOptions::default().with_timeout(Duration::MAX);
        let done = poll_until(|| async { Ok::<_, ClientError>(true) }, |done| *done, &options)
            .await
            .unwrap();
        assert!(done);
    }

    #[tokio::test(start_paused = true)]
    async fn falling_percentage_and_backward_state_are_tolerated() {
        let job = ScriptedJob::new(vec![
            Progress::new(ProgressState::Active, 60.0, "Production"),
            Progress::new(ProgressState::Active, 40.0, "Production"),
            Progress::pending(),
            Progress::new(ProgressState::Active, 80.0, "Export"),
            Progress::done(),
        ]);

        let mut seen = Vec::new();
        let last = wait_for_terminal(&job, &JobId::new("job-1"), &options(), |p| {
            seen.push((p.state, p.percentage))
        })
        .await
        .unwrap();

        assert_eq!(last, Progress::done());
        assert_eq!(
            seen,
            vec![
                (ProgressState::Active, 60),
                (ProgressState::Active, 40),
                (ProgressState::Pending, 0),
                (ProgressState::Active, 80),
                (ProgressState::Done, 100),
            ]
        );
    }
}
