//! Session-oriented command execution.
//!
//! One long-lived remote session per distinct workdir preserves shell
//! state across calls in the same logical context. Session creation
//! degrades to a shared default session rather than failing the call.

use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use daytona::{DaytonaError, ExecuteRequest, SessionExecuteRequest};

use crate::command;
use crate::preview;
use crate::sandbox::Workspace;
use crate::types::{ExecInput, ExecResult};

const DEFAULT_SESSION_KEY: &str = "default";
const DEFAULT_SESSION_ID: &str = "default-exec-session";
const REMOTE_HOME: &str = "/home/daytona";

impl Workspace {
    /// Run one prepared command in the session for the input's workdir.
    /// Remote failures come back as a failed [`ExecResult`], never as a
    /// panic or error.
    pub(crate) async fn run(&self, input: &ExecInput) -> ExecResult {
        self.preflight_remote_home(&input.cmd).await;

        let remote_workdir = match &input.workdir {
            Some(workdir) => self.mapper.map(workdir),
            None => self.root_dir.clone(),
        };
        let prepared = command::prepare_with_workdir(&input.cmd, &self.root_dir, &remote_workdir);
        debug!("prepared command: {prepared}");

        let key = input
            .workdir
            .clone()
            .unwrap_or_else(|| DEFAULT_SESSION_KEY.to_string());
        let session_id = self.session_for(&key).await;

        let mut request = SessionExecuteRequest::new(prepared.clone());
        if let Some(seconds) = input
            .timeout_ms
            .filter(|ms| *ms > 0)
            .map(|ms| (ms / 1000) as i32)
        {
            request = request.timeout(seconds);
        }

        let mut result = match self
            .provider
            .execute_session_command(&self.sandbox_id, &session_id, &request)
            .await
        {
            Ok(response) => {
                let mut result = ExecResult {
                    stdout: response.output.unwrap_or_default(),
                    stderr: response.error.unwrap_or_default(),
                    exit_code: response.exit_code.unwrap_or(0),
                };
                // Inline output is sometimes empty even though the command
                // wrote plenty; the log stream has it.
                if result.stdout.is_empty() {
                    if let Some(cmd_id) = response.cmd_id.as_deref() {
                        match self
                            .provider
                            .session_command_logs(&self.sandbox_id, &session_id, cmd_id)
                            .await
                        {
                            Ok(logs) => result.stdout = logs,
                            Err(err) => debug!("log fetch for {cmd_id} failed: {err}"),
                        }
                    }
                }
                result
            }
            Err(err) => {
                if is_workspace_lost(&err) {
                    self.lost.store(true, Ordering::SeqCst);
                }
                ExecResult::failure(err.to_string())
            }
        };

        self.annotate_server_output(&prepared, &mut result).await;
        result
    }

    /// The remote session id for a session key, creating it on first use.
    /// At most one create RPC fires per key (the map lock is held across
    /// the call). Creation failure degrades to the default session.
    pub(crate) async fn session_for(&self, key: &str) -> String {
        let mut sessions = self.sessions.lock().await;
        if let Some(id) = sessions.get(key) {
            return id.clone();
        }
        let session_id = format!("exec-session-{}-{}", sanitize_key(key), now_ms());
        match self.provider.create_session(&self.sandbox_id, &session_id).await {
            Ok(()) => {
                debug!("created session {session_id} for key {key}");
                sessions.insert(key.to_string(), session_id.clone());
                session_id
            }
            Err(err) => {
                warn!("session create for key {key} failed, using default session: {err}");
                match self
                    .provider
                    .create_session(&self.sandbox_id, DEFAULT_SESSION_ID)
                    .await
                {
                    Ok(()) => {}
                    Err(err) if err.is_already_exists() => {}
                    Err(err) => warn!("default session create failed: {err}"),
                }
                sessions.insert(key.to_string(), DEFAULT_SESSION_ID.to_string());
                DEFAULT_SESSION_ID.to_string()
            }
        }
    }

    pub(crate) async fn preview_link(&self, port: u16) -> crate::preview::PreviewLink {
        match self.provider.preview_link(&self.sandbox_id, port).await {
            Ok(link) => crate::preview::PreviewLink {
                url: link.url,
                token: link
                    .token
                    .unwrap_or_else(|| preview::FALLBACK_TOKEN.to_string()),
            },
            Err(err) => {
                warn!("preview link lookup for port {port} failed, synthesizing: {err}");
                preview::synthesize(&self.sandbox_id, port)
            }
        }
    }

    async fn annotate_server_output(&self, prepared: &str, result: &mut ExecResult) {
        if !preview::looks_like_server(prepared) {
            return;
        }
        let port = preview::resolve_port(prepared, &result.stdout);
        let link = self.preview_link(port).await;
        preview::annotate(result, &link, port);
    }

    /// Commands that reference the conventional remote home get it created
    /// ahead of time if a custom snapshot lacks it. Errors are swallowed.
    async fn preflight_remote_home(&self, cmd: &[String]) {
        if !cmd.iter().any(|arg| arg.contains(REMOTE_HOME)) {
            return;
        }
        let probe = ExecuteRequest::new(format!(
            "test -d {REMOTE_HOME} && echo exists || echo missing"
        ));
        let missing = match self.provider.execute(&self.sandbox_id, &probe).await {
            Ok(response) => response.result.contains("missing"),
            Err(err) => {
                debug!("remote home probe failed: {err}");
                return;
            }
        };
        if !missing {
            return;
        }
        if self
            .provider
            .create_folder(&self.sandbox_id, REMOTE_HOME)
            .await
            .is_err()
        {
            let mkdir = ExecuteRequest::new(format!("mkdir -p {REMOTE_HOME}"));
            if let Err(err) = self.provider.execute(&self.sandbox_id, &mkdir).await {
                debug!("mkdir fallback for {REMOTE_HOME} failed: {err}");
            }
        }
    }
}

/// Distinguish the sandbox itself being gone from an ordinary remote
/// failure; only the former invalidates the workspace.
fn is_workspace_lost(err: &DaytonaError) -> bool {
    matches!(
        err,
        DaytonaError::ApiError { status: 404, message }
            if message.to_lowercase().contains("sandbox")
    )
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
