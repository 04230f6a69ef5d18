//! Response envelopes and request bodies of the job services.

use serde::{Deserialize, Deserializer, Serialize};

use realitycap_core::{ITwinId, Job, JobId, JobState, Workspace, WorkspaceId};

#[derive(Debug, Deserialize)]
pub(crate) struct JobEnvelope {
    pub job: Job,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedJobEnvelope {
    pub job: CreatedJob,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedJob {
    pub id: JobId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProgressEnvelope {
    pub progress: WireProgress,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireProgress {
    pub state: JobState,
    #[serde(default, deserialize_with = "percentage")]
    pub percentage: f64,
    #[serde(default)]
    pub step: Option<String>,
}

/// Body of `PATCH /jobs/{id}`.
#[derive(Debug, Serialize)]
pub(crate) struct StatePatch {
    pub state: JobState,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkspaceEnvelope {
    pub workspace: Workspace,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedWorkspaceEnvelope {
    pub workspace: CreatedWorkspace,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedWorkspace {
    pub id: WorkspaceId,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewWorkspace<'a> {
    pub name: &'a str,
    #[serde(rename = "iTwinId")]
    pub itwin_id: &'a ITwinId,
}

/// Services report percentages as integers, floats, numeric strings
/// (sometimes with a `%` suffix) or `null`.
fn percentage<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(Raw::Number(n)) => Ok(n),
        Some(Raw::Text(s)) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid percentage: {s:?}"))),
    }
}
