//! Narrow seam between the core and the workspace provider.
//!
//! The core only ever talks to the remote through [`WorkspaceProvider`],
//! which names exactly the operations it needs. Tests substitute a mock;
//! production wires in [`DaytonaProvider`].

use std::time::Duration;

use async_trait::async_trait;
use daytona::{
    CreateSandbox, DaytonaClient, DaytonaConfig, ExecuteRequest, ExecuteResponse, PortPreviewUrl,
    Sandbox, SandboxState, SessionExecuteRequest, SessionExecuteResponse,
};

use crate::config::SandboxConfig;
use crate::error::SandboxError;

/// The remote operations the execution core consumes.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    async fn create_workspace(&self, request: &CreateSandbox) -> daytona::Result<Sandbox>;
    async fn wait_until_started(&self, sandbox_id: &str, timeout: Duration) -> daytona::Result<()>;
    async fn remove_workspace(&self, sandbox_id: &str) -> daytona::Result<()>;
    async fn user_root_dir(&self, sandbox_id: &str) -> daytona::Result<String>;

    async fn create_folder(&self, sandbox_id: &str, path: &str) -> daytona::Result<()>;
    async fn upload_file(&self, sandbox_id: &str, path: &str, content: &[u8])
        -> daytona::Result<()>;
    async fn delete_file(&self, sandbox_id: &str, path: &str) -> daytona::Result<()>;
    async fn download_file(&self, sandbox_id: &str, path: &str) -> daytona::Result<Vec<u8>>;

    async fn execute(
        &self,
        sandbox_id: &str,
        request: &ExecuteRequest,
    ) -> daytona::Result<ExecuteResponse>;
    async fn create_session(&self, sandbox_id: &str, session_id: &str) -> daytona::Result<()>;
    async fn execute_session_command(
        &self,
        sandbox_id: &str,
        session_id: &str,
        request: &SessionExecuteRequest,
    ) -> daytona::Result<SessionExecuteResponse>;
    async fn session_command_logs(
        &self,
        sandbox_id: &str,
        session_id: &str,
        cmd_id: &str,
    ) -> daytona::Result<String>;
    async fn delete_session(&self, sandbox_id: &str, session_id: &str) -> daytona::Result<()>;

    async fn preview_link(&self, sandbox_id: &str, port: u16) -> daytona::Result<PortPreviewUrl>;
}

/// Production provider backed by the Daytona API client.
pub struct DaytonaProvider {
    client: DaytonaClient,
}

impl DaytonaProvider {
    pub fn new(client: DaytonaClient) -> Self {
        Self { client }
    }

    /// Build a client from the core configuration.
    pub fn from_config(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let mut daytona_config = DaytonaConfig::with_api_key(config.api_key.clone());
        if let Some(api_url) = &config.api_url {
            daytona_config = daytona_config.base_url(api_url.clone());
        }
        if let Some(org) = &config.organization_id {
            daytona_config = daytona_config.organization_id(org.clone());
        }
        let client = DaytonaClient::new(daytona_config)
            .map_err(|err| SandboxError::Config(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WorkspaceProvider for DaytonaProvider {
    async fn create_workspace(&self, request: &CreateSandbox) -> daytona::Result<Sandbox> {
        self.client.create_sandbox(request).await
    }

    async fn wait_until_started(&self, sandbox_id: &str, timeout: Duration) -> daytona::Result<()> {
        self.client
            .wait_for_state(sandbox_id, SandboxState::Started, timeout)
            .await
    }

    async fn remove_workspace(&self, sandbox_id: &str) -> daytona::Result<()> {
        self.client.delete_sandbox(sandbox_id).await
    }

    async fn user_root_dir(&self, sandbox_id: &str) -> daytona::Result<String> {
        self.client.get_user_root_dir(sandbox_id).await
    }

    async fn create_folder(&self, sandbox_id: &str, path: &str) -> daytona::Result<()> {
        self.client.create_folder(sandbox_id, path).await
    }

    async fn upload_file(
        &self,
        sandbox_id: &str,
        path: &str,
        content: &[u8],
    ) -> daytona::Result<()> {
        self.client.upload_file(sandbox_id, path, content).await
    }

    async fn delete_file(&self, sandbox_id: &str, path: &str) -> daytona::Result<()> {
        self.client.delete_file(sandbox_id, path).await
    }

    async fn download_file(&self, sandbox_id: &str, path: &str) -> daytona::Result<Vec<u8>> {
        self.client.download_file(sandbox_id, path).await
    }

    async fn execute(
        &self,
        sandbox_id: &str,
        request: &ExecuteRequest,
    ) -> daytona::Result<ExecuteResponse> {
        self.client.execute_command(sandbox_id, request).await
    }

    async fn create_session(&self, sandbox_id: &str, session_id: &str) -> daytona::Result<()> {
        self.client.create_session(sandbox_id, session_id).await
    }

    async fn execute_session_command(
        &self,
        sandbox_id: &str,
        session_id: &str,
        request: &SessionExecuteRequest,
    ) -> daytona::Result<SessionExecuteResponse> {
        self.client
            .execute_session_command(sandbox_id, session_id, request)
            .await
    }

    async fn session_command_logs(
        &self,
        sandbox_id: &str,
        session_id: &str,
        cmd_id: &str,
    ) -> daytona::Result<String> {
        self.client
            .get_session_command_logs(sandbox_id, session_id, cmd_id)
            .await
    }

    async fn delete_session(&self, sandbox_id: &str, session_id: &str) -> daytona::Result<()> {
        self.client.delete_session(sandbox_id, session_id).await
    }

    async fn preview_link(&self, sandbox_id: &str, port: u16) -> daytona::Result<PortPreviewUrl> {
        self.client.get_preview_link(sandbox_id, port).await
    }
}
