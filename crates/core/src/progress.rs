//! Progress snapshots.
//!
//! A [`Progress`] is recomputed on every poll and never stored. The service
//! promises monotonic percentages while a job runs, but nothing here relies
//! on it.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::job::JobState;

/// Normalized progress state exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Pending,
    Active,
    Done,
    Failed,
    Cancelled,
}

impl ProgressState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProgressState::Done | ProgressState::Failed | ProgressState::Cancelled
        )
    }

    /// Checks that a snapshot in `next` may follow one in `self`, under the
    /// job lifecycle rules of [`JobState::can_transition_to`].
    pub fn transition_to(self, next: ProgressState) -> DomainResult<ProgressState> {
        self.job_state()
            .transition_to(next.job_state())
            .map(|_| next)
            .map_err(|_| DomainError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
    }

    // Pending stands for both unsubmitted and queued jobs; Unsubmitted allows
    // fewer moves, so Pending is the permissive choice.
    fn job_state(self) -> JobState {
        match self {
            ProgressState::Pending => JobState::Pending,
            ProgressState::Active => JobState::Active,
            ProgressState::Done => JobState::Success,
            ProgressState::Failed => JobState::Failed,
            ProgressState::Cancelled => JobState::Cancelled,
        }
    }
}

impl From<JobState> for ProgressState {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Unsubmitted | JobState::Pending => ProgressState::Pending,
            JobState::Active => ProgressState::Active,
            JobState::Success | JobState::Over => ProgressState::Done,
            JobState::Failed => ProgressState::Failed,
            JobState::Cancelled => ProgressState::Cancelled,
        }
    }
}

impl core::fmt::Display for ProgressState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ProgressState::Pending => "pending",
            ProgressState::Active => "active",
            ProgressState::Done => "done",
            ProgressState::Failed => "failed",
            ProgressState::Cancelled => "cancelled",
        })
    }
}

/// Current progress of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub state: ProgressState,
    /// Always within `0..=100`.
    pub percentage: u8,
    /// Human-readable name of the current processing step (may be empty).
    pub step: String,
}

impl Progress {
    pub fn new(state: ProgressState, percentage: f64, step: impl Into<String>) -> Self {
        Self {
            state,
            percentage: clamp_percentage(percentage),
            step: step.into(),
        }
    }

    pub fn pending() -> Self {
        Self::new(ProgressState::Pending, 0.0, "")
    }

    pub fn done() -> Self {
        Self::new(ProgressState::Done, 100.0, "")
    }

    pub fn failed() -> Self {
        Self::new(ProgressState::Failed, 0.0, "")
    }

    pub fn cancelled() -> Self {
        Self::new(ProgressState::Cancelled, 0.0, "")
    }

    /// Snapshot for a job whose own state is already settled.
    ///
    /// Returns `None` for `Active`, where only the progress endpoint knows
    /// the percentage.
    pub fn settled(state: JobState) -> Option<Self> {
        match ProgressState::from(state) {
            ProgressState::Active => None,
            ProgressState::Pending => Some(Self::pending()),
            ProgressState::Done => Some(Self::done()),
            ProgressState::Failed => Some(Self::failed()),
            ProgressState::Cancelled => Some(Self::cancelled()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl core::fmt::Display for Progress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.step.is_empty() {
            write!(f, "{} {}%", self.state, self.percentage)
        } else {
            write!(f, "{} {}% ({})", self.state, self.percentage, self.step)
        }
    }
}

/// Round and clamp a reported percentage into `0..=100`. NaN maps to 0.
pub fn clamp_percentage(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
