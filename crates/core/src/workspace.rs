//! ContextCapture workspaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ITwinId, WorkspaceId};

/// Grouping container that ContextCapture jobs are created in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "iTwinId", alias = "projectId")]
    pub itwin_id: ITwinId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<DateTime<Utc>>,
}
