//! Lazily-initialized remote workspace and its lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use daytona::{CreateSandbox, ExecuteRequest};

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::patch;
use crate::paths::{parent_dir, PathMapper};
use crate::preview::PreviewLink;
use crate::provider::{DaytonaProvider, WorkspaceProvider};
use crate::types::{ExecInput, ExecResult};

const BOOTSTRAP_DIRS: &[&str] = &["src", "tests", "docs", "config"];
const OWNER_LABEL: &str = "remote_exec_owner";
const START_TIMEOUT: Duration = Duration::from_secs(120);

/// Service handle for one remote workspace.
///
/// The workspace is created lazily on first use; concurrent callers share
/// a single in-flight initialization. All steady-state failures surface as
/// [`ExecResult`] values, never as `Err` (only configuration and
/// initialization errors propagate). The embedding binary is responsible
/// for teardown, either by calling [`RemoteSandbox::cleanup`] directly or
/// by spawning [`RemoteSandbox::cleanup_on_shutdown`].
pub struct RemoteSandbox {
    config: SandboxConfig,
    owner_id: String,
    injected: Option<Arc<dyn WorkspaceProvider>>,
    state: Mutex<Option<Arc<Workspace>>>,
}

/// Shared state of an initialized workspace.
pub(crate) struct Workspace {
    pub(crate) provider: Arc<dyn WorkspaceProvider>,
    pub(crate) sandbox_id: String,
    pub(crate) root_dir: String,
    pub(crate) mapper: PathMapper,
    /// Session-key (workdir or "default") to remote session id.
    pub(crate) sessions: Mutex<HashMap<String, String>>,
    /// Set when the remote reports the sandbox itself gone (auto-stop
    /// fired mid-session); the next `ensure_ready` then re-creates.
    pub(crate) lost: AtomicBool,
}

impl RemoteSandbox {
    /// Handle backed by the Daytona API, connecting lazily.
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            owner_id: uuid::Uuid::new_v4().to_string(),
            injected: None,
            state: Mutex::new(None),
        }
    }

    /// Handle with an injected provider (used by tests).
    pub fn with_provider(config: SandboxConfig, provider: Arc<dyn WorkspaceProvider>) -> Self {
        Self {
            config,
            owner_id: uuid::Uuid::new_v4().to_string(),
            injected: Some(provider),
            state: Mutex::new(None),
        }
    }

    /// Initialize the workspace if needed. Returns only when it is ready.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.workspace().await.map(|_| ())
    }

    /// The sandbox id, if a workspace is currently initialized.
    pub async fn sandbox_id(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|ws| ws.sandbox_id.clone())
    }

    /// Run a command in the workspace.
    pub async fn exec(&self, input: ExecInput) -> Result<ExecResult> {
        if input.cmd.is_empty() {
            return Ok(ExecResult::failure("empty command"));
        }
        let ws = self.workspace().await?;
        let result = ws.run(&input).await;
        self.reap_if_lost(&ws).await;
        Ok(result)
    }

    /// Run a command, abandoning the wait when `cancel` fires.
    ///
    /// Cancellation does not kill the remote command; the remote timeout
    /// owns that. It also never tears the workspace down.
    pub async fn exec_with_cancel(
        &self,
        input: ExecInput,
        cancel: &CancellationToken,
    ) -> Result<ExecResult> {
        if input.cmd.is_empty() {
            return Ok(ExecResult::failure("empty command"));
        }
        let ws = self.workspace().await?;
        tokio::select! {
            _ = cancel.cancelled() => Ok(ExecResult::failure("cancelled")),
            result = ws.run(&input) => {
                self.reap_if_lost(&ws).await;
                Ok(result)
            }
        }
    }

    /// Apply an add/delete patch against the remote filesystem.
    ///
    /// Malformed fencing fails the whole patch; individual file failures
    /// are reported in stdout and leave the exit code at zero.
    pub async fn apply_patch(&self, patch_text: &str) -> Result<ExecResult> {
        let ops = match patch::parse_patch(patch_text) {
            Ok(ops) => ops,
            Err(err) => return Ok(ExecResult::failure(err.to_string())),
        };
        let ws = self.workspace().await?;
        let log = patch::apply_ops(ws.provider.as_ref(), &ws.sandbox_id, &ws.mapper, &ops).await;
        let stdout = if log.is_empty() {
            "Patch applied successfully".to_string()
        } else {
            log
        };
        Ok(ExecResult {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        })
    }

    /// Best-effort upload of `content` to the mapped location of
    /// `host_path`. Returns whether the file verifiably exists afterwards.
    pub async fn upload_file(&self, host_path: &str, content: &[u8]) -> Result<bool> {
        let ws = self.workspace().await?;
        let remote = ws.mapper.map(host_path);
        if let Some(parent) = parent_dir(&remote) {
            if let Err(err) = ws.provider.create_folder(&ws.sandbox_id, &parent).await {
                debug!("parent mkdir for {remote} failed: {err}");
            }
        }
        if let Err(err) = ws.provider.upload_file(&ws.sandbox_id, &remote, content).await {
            warn!("upload to {remote} failed: {err}");
            return Ok(false);
        }
        let verify = ExecuteRequest::new(format!(
            "test -f \"{remote}\" && echo exists || echo missing"
        ));
        match ws.provider.execute(&ws.sandbox_id, &verify).await {
            Ok(response) => Ok(response.result.contains("exists")),
            Err(err) => {
                warn!("upload verification for {remote} failed: {err}");
                Ok(false)
            }
        }
    }

    /// Read a remote file via `cat`. Absent files read as empty.
    pub async fn download_file(&self, remote_path: &str) -> Result<String> {
        let ws = self.workspace().await?;
        let request = ExecuteRequest::new(format!("cat \"{remote_path}\""));
        match ws.provider.execute(&ws.sandbox_id, &request).await {
            Ok(response) if response.exit_code() == 0 => Ok(response.result),
            Ok(_) => Ok(String::new()),
            Err(err) => {
                warn!("download of {remote_path} failed: {err}");
                Ok(String::new())
            }
        }
    }

    /// Resolve (or synthesize) the preview link for a workspace port.
    pub async fn preview_link(&self, port: u16) -> Result<PreviewLink> {
        let ws = self.workspace().await?;
        Ok(ws.preview_link(port).await)
    }

    /// Tear the workspace down. Idempotent, tolerant of partial state, and
    /// never fails: every remote error is logged and swallowed.
    pub async fn cleanup(&self) {
        let taken = { self.state.lock().await.take() };
        let Some(ws) = taken else {
            return;
        };
        let sessions: Vec<String> = {
            let mut guard = ws.sessions.lock().await;
            guard.drain().map(|(_, id)| id).collect()
        };
        for session_id in sessions {
            if let Err(err) = ws.provider.delete_session(&ws.sandbox_id, &session_id).await {
                warn!("failed to delete session {session_id}: {err}");
            }
        }
        if let Err(err) = ws.provider.remove_workspace(&ws.sandbox_id).await {
            warn!("failed to remove workspace {}: {err}", ws.sandbox_id);
        }
        info!("remote workspace {} cleaned up", ws.sandbox_id);
    }

    /// Wait for SIGINT/SIGTERM, then clean up. Spawn this from the
    /// embedding binary to guarantee teardown on termination.
    pub async fn cleanup_on_shutdown(&self) {
        wait_for_shutdown_signal().await;
        self.cleanup().await;
    }

    /// Forget a workspace the remote reported gone. The sandbox is already
    /// destroyed, so there is nothing to tear down remotely.
    async fn reap_if_lost(&self, ws: &Arc<Workspace>) {
        if !ws.lost.load(Ordering::SeqCst) {
            return;
        }
        let mut slot = self.state.lock().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, ws)) {
            *slot = None;
            warn!(
                "remote workspace {} lost, will re-initialize on next use",
                ws.sandbox_id
            );
        }
    }

    /// Get the initialized workspace, creating it under the lifecycle lock
    /// if needed. Holding the lock across create+probe is what makes
    /// concurrent first calls share one in-flight initialization.
    async fn workspace(&self) -> Result<Arc<Workspace>> {
        let mut slot = self.state.lock().await;
        if let Some(ws) = slot.as_ref() {
            return Ok(ws.clone());
        }
        self.config.validate()?;

        let provider: Arc<dyn WorkspaceProvider> = match &self.injected {
            Some(provider) => provider.clone(),
            None => Arc::new(DaytonaProvider::from_config(&self.config)?),
        };

        let mut labels = HashMap::new();
        labels.insert(OWNER_LABEL.to_string(), self.owner_id.clone());
        let request = CreateSandbox::new(self.config.snapshot.clone())
            .target(self.config.target.clone())
            .auto_stop_interval(self.config.auto_stop_minutes)
            .labels(labels);

        let sandbox = provider
            .create_workspace(&request)
            .await
            .map_err(|err| SandboxError::Init(format!("workspace create failed: {err}")))?;
        info!("created remote workspace {}", sandbox.id);

        provider
            .wait_until_started(&sandbox.id, START_TIMEOUT)
            .await
            .map_err(|err| SandboxError::Init(format!("workspace failed to start: {err}")))?;

        let root_dir = provider
            .user_root_dir(&sandbox.id)
            .await
            .map_err(|err| SandboxError::Init(format!("root dir probe failed: {err}")))?;
        if root_dir.is_empty() {
            return Err(SandboxError::Init(
                "workspace reported an empty root dir".to_string(),
            ));
        }
        debug!("workspace root dir is {root_dir}");

        let ws = Arc::new(Workspace {
            provider,
            sandbox_id: sandbox.id,
            root_dir: root_dir.clone(),
            mapper: PathMapper::new(root_dir),
            sessions: Mutex::new(HashMap::new()),
            lost: AtomicBool::new(false),
        });
        *slot = Some(ws.clone());

        // Bootstrap common directories off the critical path; failures are
        // logged and swallowed.
        let bootstrap = ws.clone();
        tokio::spawn(async move {
            for dir in BOOTSTRAP_DIRS {
                let path = format!("{}/{dir}", bootstrap.root_dir.trim_end_matches('/'));
                if let Err(err) = bootstrap
                    .provider
                    .create_folder(&bootstrap.sandbox_id, &path)
                    .await
                {
                    warn!("bootstrap mkdir {path} failed: {err}");
                }
            }
        });

        Ok(ws)
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            warn!("failed to install SIGTERM handler: {err}");
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
