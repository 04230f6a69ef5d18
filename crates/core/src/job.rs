//! Job types, lifecycle states and job snapshots.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::id::{ITwinId, JobId, WorkspaceId};

/// Remote service that executes a family of job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    /// ContextCapture reconstruction.
    ContextCapture,
    /// Reality data analysis (detection, segmentation).
    RealityAnalysis,
    /// Reality data format conversion.
    RealityConversion,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 3] = [
        ServiceKind::ContextCapture,
        ServiceKind::RealityAnalysis,
        ServiceKind::RealityConversion,
    ];

    /// Path segment appended to the API base URL.
    pub fn path(self) -> &'static str {
        match self {
            ServiceKind::ContextCapture => "contextcapture",
            ServiceKind::RealityAnalysis => "realitydataanalysis",
            ServiceKind::RealityConversion => "realityconversion",
        }
    }
}

impl core::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ServiceKind::ContextCapture => "ContextCapture",
            ServiceKind::RealityAnalysis => "RealityAnalysis",
            ServiceKind::RealityConversion => "RealityConversion",
        })
    }
}

/// Kind of processing requested from a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    // ContextCapture
    Calibration,
    Full,
    Production,
    Reconstruction,
    // Reality analysis
    Objects2D,
    Segmentation2D,
    Segmentation3D,
    SegmentationOrthophoto,
    ChangeDetection,
    ExtractGround,
    // Reality conversion
    Conversion,
}

impl JobType {
    pub const ALL: [JobType; 11] = [
        JobType::Calibration,
        JobType::Full,
        JobType::Production,
        JobType::Reconstruction,
        JobType::Objects2D,
        JobType::Segmentation2D,
        JobType::Segmentation3D,
        JobType::SegmentationOrthophoto,
        JobType::ChangeDetection,
        JobType::ExtractGround,
        JobType::Conversion,
    ];

    /// Token used on the wire, in the casing each service expects.
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Calibration => "Calibration",
            JobType::Full => "Full",
            JobType::Production => "Production",
            JobType::Reconstruction => "Reconstruction",
            JobType::Objects2D => "objects2D",
            JobType::Segmentation2D => "segmentation2D",
            JobType::Segmentation3D => "segmentation3D",
            JobType::SegmentationOrthophoto => "segmentationOrthophoto",
            JobType::ChangeDetection => "changeDetection",
            JobType::ExtractGround => "extractGround",
            JobType::Conversion => "Conversion",
        }
    }

    /// Service responsible for this job type.
    pub fn service(self) -> ServiceKind {
        match self {
            JobType::Calibration
            | JobType::Full
            | JobType::Production
            | JobType::Reconstruction => ServiceKind::ContextCapture,
            JobType::Objects2D
            | JobType::Segmentation2D
            | JobType::Segmentation3D
            | JobType::SegmentationOrthophoto
            | JobType::ChangeDetection
            | JobType::ExtractGround => ServiceKind::RealityAnalysis,
            JobType::Conversion => ServiceKind::RealityConversion,
        }
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown job type: {s:?}")))
    }
}

impl Serialize for JobType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Lifecycle state of a job as observed from the service.
///
/// ```text
/// Unsubmitted -> Pending -> Active -> { Success | Over | Failed | Cancelled }
/// ```
///
/// `Success` and `Over` are both used by services to mean "finished"; callers
/// should go through [`JobState::is_success`] rather than matching either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Unsubmitted,
    Pending,
    Active,
    Success,
    Over,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Unsubmitted => "unsubmitted",
            JobState::Pending => "pending",
            JobState::Active => "active",
            JobState::Success => "success",
            JobState::Over => "over",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Over | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, JobState::Success | JobState::Over)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, JobState::Failed | JobState::Cancelled)
    }

    /// Whether the service can legitimately move a job from `self` to `next`.
    ///
    /// Re-observing the same state is always allowed; nothing leaves a
    /// terminal state.
    pub fn can_transition_to(self, next: JobState) -> bool {
        if self == next {
            return true;
        }
        match self {
            JobState::Unsubmitted => matches!(
                next,
                JobState::Pending | JobState::Active | JobState::Cancelled
            ),
            JobState::Pending => !matches!(next, JobState::Unsubmitted),
            JobState::Active => next.is_terminal(),
            JobState::Success | JobState::Over | JobState::Failed | JobState::Cancelled => false,
        }
    }

    /// Checked variant of [`JobState::can_transition_to`].
    pub fn transition_to(self, next: JobState) -> DomainResult<JobState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl core::fmt::Display for JobState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s.trim().to_ascii_lowercase().as_str() {
            "unsubmitted" => JobState::Unsubmitted,
            "pending" | "queued" | "inactive" => JobState::Pending,
            "active" | "running" => JobState::Active,
            "success" | "completed" => JobState::Success,
            "over" => JobState::Over,
            "failed" => JobState::Failed,
            "cancelled" | "canceled" => JobState::Cancelled,
            other => return Err(DomainError::validation(format!("unknown job state: {other:?}"))),
        };
        Ok(state)
    }
}

impl Serialize for JobState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Job-type-specific inputs, outputs and options.
///
/// Kept as opaque JSON: each job type has its own schema, owned by the
/// service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpecification {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub inputs: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub outputs: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,
}

/// Timing information reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecution {
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_units: Option<f64>,
}

/// Snapshot of a job as returned by `GET /jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "iTwinId", alias = "projectId")]
    pub itwin_id: ITwinId,
    pub state: JobState,
    #[serde(default, alias = "settings")]
    pub specification: JobSpecification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<WorkspaceId>,
    #[serde(
        default,
        rename = "executionInformation",
        alias = "executionInfo",
        skip_serializing_if = "Option::is_none"
    )]
    pub execution: Option<JobExecution>,
}

impl Job {
    pub fn outputs(&self) -> &Value {
        &self.specification.outputs
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Payload for `POST /jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub name: String,
    #[serde(rename = "iTwinId")]
    pub itwin_id: ITwinId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub specification: JobSpecification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<WorkspaceId>,
}

impl NewJob {
    pub fn new(name: impl Into<String>, itwin_id: ITwinId, job_type: JobType) -> Self {
        Self {
            name: name.into(),
            itwin_id,
            job_type,
            specification: JobSpecification::default(),
            workspace_id: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.specification.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Value) -> Self {
        self.specification.outputs = outputs;
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.specification.options = options;
        self
    }

    pub fn with_workspace(mut self, workspace_id: WorkspaceId) -> Self {
        self.workspace_id = Some(workspace_id);
        self
    }

    pub fn service(&self) -> ServiceKind {
        self.job_type.service()
    }
}
