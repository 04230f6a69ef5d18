//! ContextCapture workspaces.
//!
//! ContextCapture jobs are created inside a workspace; the other services
//! have no such container.

use std::sync::Arc;

use tracing::info;

use realitycap_auth::TokenProvider;
use realitycap_core::{ITwinId, ServiceKind, Workspace, WorkspaceId};

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::transport::Transport;
use crate::wire::{CreatedWorkspaceEnvelope, NewWorkspace, WorkspaceEnvelope};

#[derive(Debug, Clone)]
pub struct WorkspaceClient {
    transport: Transport,
}

impl WorkspaceClient {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> ClientResult<Self> {
        Ok(Self {
            transport: Transport::new(config, ServiceKind::ContextCapture, tokens)?,
        })
    }

    pub fn with_transport(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn create_workspace(
        &self,
        name: &str,
        itwin_id: &ITwinId,
    ) -> ClientResult<WorkspaceId> {
        let created: CreatedWorkspaceEnvelope = self
            .transport
            .post(&["workspaces"], &NewWorkspace { name, itwin_id })
            .await?;
        info!(workspace_id = %created.workspace.id, %itwin_id, "workspace created");
        Ok(created.workspace.id)
    }

    pub async fn get_workspace(&self, id: &WorkspaceId) -> ClientResult<Workspace> {
        let envelope: WorkspaceEnvelope = self.transport.get(&["workspaces", id.as_str()]).await?;
        Ok(envelope.workspace)
    }

    pub async fn delete_workspace(&self, id: &WorkspaceId) -> ClientResult<()> {
        self.transport.delete(&["workspaces", id.as_str()]).await?;
        info!(workspace_id = %id, "workspace deleted");
        Ok(())
    }
}
