//! Web-server detection and preview-link annotation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::ExecResult;

/// A public HTTPS URL forwarding to a TCP port inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewLink {
    pub url: String,
    pub token: String,
}

pub(crate) const FALLBACK_TOKEN: &str = "auth-required";

const DEFAULT_PORT: u16 = 8000;
const FLASK_DEFAULT_PORT: u16 = 5000;
const NODE_DEFAULT_PORT: u16 = 3000;

static RUNNING_ON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Running on https?://[^\s:/]+:(\d{1,5})").expect("static regex"));
static ANNOUNCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:listening|started|running|server)[^\r\n\d]*(?:port|:)\s*(\d{2,5})")
        .expect("static regex")
});
static PORT_FLAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:--port[= ](\d{1,5})|-p\s+(\d{1,5}))").expect("static regex"));

/// Heuristic: does this prepared command look like a web-server launch?
pub(crate) fn looks_like_server(command: &str) -> bool {
    command.contains("flask run")
        || (command.contains("python") && command.contains("app.py"))
        || command.contains("node ")
        || command.contains("npm start")
        || command.contains("npm run dev")
        || command.contains("npx")
        || command.contains("rails server")
        || command.contains("rails s")
        || command.contains("server")
        || command.contains("serve")
        || command.contains("express")
        || command.contains("http-server")
        || command.contains("live-server")
}

/// Find the port the server is (probably) bound to.
///
/// Order: the server's own "Running on" line, then a looser announcement
/// pattern, then an explicit `--port`/`-p` flag, then framework defaults.
pub(crate) fn resolve_port(command: &str, stdout: &str) -> u16 {
    // The server rewrite echoes "... started with PID: <pid>"; keep the
    // announcement scan from mistaking the PID for a port.
    let scannable: String = stdout
        .lines()
        .filter(|line| !line.contains("started with PID"))
        .collect::<Vec<_>>()
        .join("\n");
    if let Some(port) = RUNNING_ON_RE
        .captures(&scannable)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
    {
        return port;
    }
    if let Some(port) = ANNOUNCE_RE
        .captures(&scannable)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
    {
        return port;
    }
    if let Some(caps) = PORT_FLAG_RE.captures(command) {
        if let Some(port) = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse().ok())
        {
            return port;
        }
    }
    if command.contains("flask") || command.contains("app.py") {
        FLASK_DEFAULT_PORT
    } else if command.contains("rails") || command.contains("next") || command.contains("vite") {
        NODE_DEFAULT_PORT
    } else {
        DEFAULT_PORT
    }
}

/// Synthesize a preview URL when the provider cannot resolve one.
pub(crate) fn synthesize(sandbox_id: &str, port: u16) -> PreviewLink {
    let node = &sandbox_id[..sandbox_id.len().min(6)];
    PreviewLink {
        url: format!("https://{port}-{sandbox_id}.{node}.daytona.work"),
        token: FALLBACK_TOKEN.to_string(),
    }
}

/// Append the preview banner to stdout and a short summary to stderr, so
/// the annotation survives stdout truncation.
pub(crate) fn annotate(result: &mut ExecResult, link: &PreviewLink, port: u16) {
    result.stdout.push_str(&format!(
        "\n\n====== PREVIEW LINK ======\n{}\n=========================\n",
        link.url
    ));
    result.stderr.push_str(&format!(
        "PREVIEW LINK: {}\nLOCAL ACCESS: http://localhost:{port}\n",
        link.url
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_server_detection() {
        assert!(looks_like_server("flask run"));
        assert!(looks_like_server("nohup python /home/daytona/app.py > flask.log 2>&1 &"));
        assert!(looks_like_server("npm run dev"));
        assert!(looks_like_server("rails s"));
        assert!(looks_like_server("npx http-server ."));
        assert!(!looks_like_server("cat notes.txt"));
        assert!(!looks_like_server("git status"));
    }

    #[test]
    fn test_port_from_running_on_line() {
        let stdout = " * Running on http://127.0.0.1:5001\n";
        assert_eq!(resolve_port("python app.py", stdout), 5001);
    }

    #[test]
    fn test_port_from_announcement() {
        let stdout = "Server listening on port 4321\n";
        assert_eq!(resolve_port("node server.js", stdout), 4321);
        let stdout = "started at :9090\n";
        assert_eq!(resolve_port("./serve", stdout), 9090);
    }

    #[test]
    fn test_port_from_command_flag() {
        assert_eq!(resolve_port("npx http-server --port=8081", ""), 8081);
        assert_eq!(resolve_port("flask run -p 7000", ""), 7000);
    }

    #[test]
    fn test_pid_echo_is_not_a_port() {
        let stdout = "Flask app started with PID: 42\n";
        assert_eq!(resolve_port("nohup python app.py", stdout), 5000);
    }

    #[test]
    fn test_framework_default_ports() {
        assert_eq!(resolve_port("flask run", ""), 5000);
        assert_eq!(resolve_port("python app.py", ""), 5000);
        assert_eq!(resolve_port("rails server", ""), 3000);
        assert_eq!(resolve_port("npx vite", ""), 3000);
        assert_eq!(resolve_port("./my-server", ""), 8000);
    }

    #[test]
    fn test_synthesized_url_shape() {
        let link = synthesize("sandbox-abc123", 5000);
        assert_eq!(
            link.url,
            "https://5000-sandbox-abc123.sandbo.daytona.work"
        );
        assert_eq!(link.token, "auth-required");
    }

    #[test]
    fn test_synthesize_with_short_sandbox_id() {
        let link = synthesize("ab", 80);
        assert_eq!(link.url, "https://80-ab.ab.daytona.work");
    }

    #[test]
    fn test_annotation_lands_in_both_streams() {
        let mut result = ExecResult {
            stdout: "Flask app started with PID: 12".to_string(),
            stderr: String::new(),
            exit_code: 0,
        };
        let link = synthesize("sb-1", 5000);
        annotate(&mut result, &link, 5000);
        assert!(result.stdout.contains("====== PREVIEW LINK ======"));
        assert!(result.stdout.contains(&link.url));
        assert!(result.stderr.starts_with("PREVIEW LINK: "));
        assert!(result.stderr.contains("LOCAL ACCESS: http://localhost:5000"));
    }
}
