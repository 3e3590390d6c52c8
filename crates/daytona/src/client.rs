//! HTTP client for the Daytona API.

use crate::error::{DaytonaError, Result};
use crate::models::*;
use reqwest::Client;
use std::time::{Duration, Instant};

/// Default Daytona API base URL.
const DEFAULT_BASE_URL: &str = "https://app.daytona.io/api";
const REQUEST_TIMEOUT_SECS: u64 = 300;
const STATE_POLL_INTERVAL_MS: u64 = 1000;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct DaytonaConfig {
    api_key: String,
    base_url: String,
    organization_id: Option<String>,
}

impl DaytonaConfig {
    /// Configuration with an API key and the default base URL.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            organization_id: None,
        }
    }

    /// Override the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Scope requests to an organization.
    pub fn organization_id(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}

/// Daytona API client.
///
/// Sandbox management lives under `/sandbox`; filesystem and process
/// operations go through the per-sandbox toolbox endpoints.
#[derive(Clone)]
pub struct DaytonaClient {
    config: DaytonaConfig,
    http: Client,
}

impl DaytonaClient {
    /// Create a new client.
    pub fn new(config: DaytonaConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(DaytonaError::NotConfigured(
                "API key must not be empty".to_string(),
            ));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(DaytonaError::RequestFailed)?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn toolbox_url(&self, sandbox_id: &str, path: &str) -> String {
        self.url(&format!(
            "toolbox/{sandbox_id}/toolbox/{}",
            path.trim_start_matches('/')
        ))
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, url)
            .bearer_auth(&self.config.api_key);
        if let Some(org) = &self.config.organization_id {
            builder = builder.header("X-Daytona-Organization-ID", org);
        }
        builder
    }

    async fn check_response(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.as_u16() == 401 {
            return Err(DaytonaError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|value| {
                    value
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or(body);
            return Err(DaytonaError::ApiError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    // ---------- Sandboxes ----------

    /// Create a sandbox.
    pub async fn create_sandbox(&self, request: &CreateSandbox) -> Result<Sandbox> {
        let response = self
            .request(reqwest::Method::POST, self.url("sandbox"))
            .json(request)
            .send()
            .await?;
        let response = self.check_response(response).await?;
        Ok(response.json().await?)
    }

    /// Fetch a sandbox by id.
    pub async fn get_sandbox(&self, sandbox_id: &str) -> Result<Sandbox> {
        let response = self
            .request(reqwest::Method::GET, self.url(&format!("sandbox/{sandbox_id}")))
            .send()
            .await?;
        let response = self.check_response(response).await?;
        Ok(response.json().await?)
    }

    /// Destroy a sandbox.
    pub async fn delete_sandbox(&self, sandbox_id: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                self.url(&format!("sandbox/{sandbox_id}")),
            )
            .send()
            .await?;
        self.check_response(response).await?;
        Ok(())
    }

    /// Poll until the sandbox reaches the wanted state or the deadline passes.
    pub async fn wait_for_state(
        &self,
        sandbox_id: &str,
        wanted: SandboxState,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let sandbox = self.get_sandbox(sandbox_id).await?;
            match sandbox.state {
                Some(state) if state == wanted => return Ok(()),
                Some(SandboxState::Error) => {
                    return Err(DaytonaError::InvalidResponse(
                        sandbox
                            .error_reason
                            .unwrap_or_else(|| "sandbox entered error state".to_string()),
                    ));
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(DaytonaError::StateTimeout);
            }
            tokio::time::sleep(Duration::from_millis(STATE_POLL_INTERVAL_MS)).await;
        }
    }

    /// Resolve the user root directory inside the sandbox.
    pub async fn get_user_root_dir(&self, sandbox_id: &str) -> Result<String> {
        let response = self
            .request(
                reqwest::Method::GET,
                self.toolbox_url(sandbox_id, "project-dir"),
            )
            .send()
            .await?;
        let response = self.check_response(response).await?;
        let body: ProjectDirResponse = response.json().await?;
        Ok(body.dir)
    }

    // ---------- Process ----------

    /// Run a one-shot command in the sandbox.
    pub async fn execute_command(
        &self,
        sandbox_id: &str,
        request: &ExecuteRequest,
    ) -> Result<ExecuteResponse> {
        let response = self
            .request(
                reqwest::Method::POST,
                self.toolbox_url(sandbox_id, "process/execute"),
            )
            .json(request)
            .send()
            .await?;
        let response = self.check_response(response).await?;
        Ok(response.json().await?)
    }

    /// Create a named exec session.
    pub async fn create_session(&self, sandbox_id: &str, session_id: &str) -> Result<()> {
        let request = CreateSessionRequest {
            session_id: session_id.to_string(),
        };
        let response = self
            .request(
                reqwest::Method::POST,
                self.toolbox_url(sandbox_id, "process/session"),
            )
            .json(&request)
            .send()
            .await?;
        self.check_response(response).await?;
        Ok(())
    }

    /// Run a command inside an exec session.
    pub async fn execute_session_command(
        &self,
        sandbox_id: &str,
        session_id: &str,
        request: &SessionExecuteRequest,
    ) -> Result<SessionExecuteResponse> {
        let response = self
            .request(
                reqwest::Method::POST,
                self.toolbox_url(sandbox_id, &format!("process/session/{session_id}/exec")),
            )
            .json(request)
            .send()
            .await?;
        let response = self.check_response(response).await?;
        Ok(response.json().await?)
    }

    /// Fetch the accumulated logs of a session command.
    pub async fn get_session_command_logs(
        &self,
        sandbox_id: &str,
        session_id: &str,
        cmd_id: &str,
    ) -> Result<String> {
        let response = self
            .request(
                reqwest::Method::GET,
                self.toolbox_url(
                    sandbox_id,
                    &format!("process/session/{session_id}/command/{cmd_id}/logs"),
                ),
            )
            .send()
            .await?;
        let response = self.check_response(response).await?;
        Ok(response.text().await?)
    }

    /// Delete an exec session.
    pub async fn delete_session(&self, sandbox_id: &str, session_id: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                self.toolbox_url(sandbox_id, &format!("process/session/{session_id}")),
            )
            .send()
            .await?;
        self.check_response(response).await?;
        Ok(())
    }

    // ---------- Filesystem ----------

    /// Create a folder (and parents) inside the sandbox.
    pub async fn create_folder(&self, sandbox_id: &str, path: &str) -> Result<()> {
        let url = format!(
            "{}?path={}&mode=0755",
            self.toolbox_url(sandbox_id, "files/folder"),
            urlencoding::encode(path)
        );
        let response = self.request(reqwest::Method::POST, url).send().await?;
        self.check_response(response).await?;
        Ok(())
    }

    /// Upload a file, replacing any existing content.
    pub async fn upload_file(&self, sandbox_id: &str, path: &str, content: &[u8]) -> Result<()> {
        let url = format!(
            "{}?path={}",
            self.toolbox_url(sandbox_id, "files/upload"),
            urlencoding::encode(path)
        );
        let part = reqwest::multipart::Part::bytes(content.to_vec()).file_name("file");
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .request(reqwest::Method::POST, url)
            .multipart(form)
            .send()
            .await?;
        self.check_response(response).await?;
        Ok(())
    }

    /// Delete a file.
    pub async fn delete_file(&self, sandbox_id: &str, path: &str) -> Result<()> {
        let url = format!(
            "{}?path={}",
            self.toolbox_url(sandbox_id, "files"),
            urlencoding::encode(path)
        );
        let response = self.request(reqwest::Method::DELETE, url).send().await?;
        self.check_response(response).await?;
        Ok(())
    }

    /// Download a file's content.
    pub async fn download_file(&self, sandbox_id: &str, path: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}?path={}",
            self.toolbox_url(sandbox_id, "files/download"),
            urlencoding::encode(path)
        );
        let response = self.request(reqwest::Method::GET, url).send().await?;
        let response = self.check_response(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---------- Preview ----------

    /// Resolve the public preview URL for a TCP port inside the sandbox.
    pub async fn get_preview_link(&self, sandbox_id: &str, port: u16) -> Result<PortPreviewUrl> {
        let response = self
            .request(
                reqwest::Method::GET,
                self.url(&format!("sandbox/{sandbox_id}/ports/{port}/preview-url")),
            )
            .send()
            .await?;
        let response = self.check_response(response).await?;
        Ok(response.json().await?)
    }
}
