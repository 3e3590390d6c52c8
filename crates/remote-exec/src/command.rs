//! Argv to remote shell-string lowering.
//!
//! The remote process API accepts a single string; several quoting,
//! redirection, and process-lifetime patterns round-trip incorrectly when
//! the remote re-splits it. Commands that need shell semantics are wrapped
//! in `/bin/sh -c '...'`, and a short, auditable table of rewrites fixes
//! the commands observed to misbehave (`timeout`, `sleep`, `nohup`,
//! inline python, foreground server launches). Everything else is passed
//! through untouched.

use once_cell::sync::Lazy;
use regex::Regex;

const SHELL_WRAP_PREFIX: &str = "/bin/sh -c";

/// Commands whose bare-filename first argument should be rooted under the
/// workspace root, so `cat notes.txt` works regardless of the remote cwd.
static SIMPLE_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(rm|ls|cat|chmod|python|python3|head|tail|mkdir)\s+([^/\\\s-]+)(\s|$)")
        .expect("static regex")
});

static PYTHON_INLINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^python3?\s+-c\s+(.+)$").expect("static regex"));
static TIMEOUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^timeout\s+(?:-t\s+)?(\d+)\s+(.+)$").expect("static regex"));
static SLEEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sleep\s+(\d+(?:\.\d+)?)$").expect("static regex"));
static NOHUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^nohup\s+(.+)$").expect("static regex"));

/// Tokens that only behave as expected under a shell.
const SHELL_TOKENS: &[&str] = &["echo", "which", "find", "grep", "nohup"];

type Rewriter = fn(&str) -> Option<String>;

/// Ordered rewrite table. First match wins; consulted before the generic
/// shell-wrap decision so a rewrite sees the original command text.
const REWRITES: &[(&str, Rewriter)] = &[
    ("python-inline", rewrite_python_inline),
    ("timeout", rewrite_timeout),
    ("sleep", rewrite_sleep),
    ("nohup", rewrite_nohup),
    ("server-launch", rewrite_server_launch),
];

/// Lower an argv to the shell string submitted to the remote session,
/// prefixed with a `cd` into the remote working directory.
pub(crate) fn prepare_with_workdir(cmd: &[String], root_dir: &str, remote_workdir: &str) -> String {
    format!("cd {} && {}", remote_workdir, prepare(cmd, root_dir))
}

/// Lower an argv to a shell string without the `cd` prefix.
pub(crate) fn prepare(cmd: &[String], root_dir: &str) -> String {
    let joined = cmd.join(" ");
    let rooted = root_simple_filename(&joined, root_dir);

    // Already-wrapped commands pass through untouched.
    if rooted.starts_with(SHELL_WRAP_PREFIX) {
        return rooted;
    }
    for (name, rewrite) in REWRITES {
        if let Some(rewritten) = rewrite(&rooted) {
            tracing::debug!("command rewrite fired: {name}");
            return rewritten;
        }
    }
    if needs_shell(&rooted) {
        return wrap(&rooted);
    }
    rooted
}

/// Root a bare-filename argument of a known file command under `root_dir`.
/// The pattern rejects flags and anything containing a path separator.
fn root_simple_filename(s: &str, root_dir: &str) -> String {
    SIMPLE_FILE_RE
        .replace(s, |caps: &regex::Captures| {
            format!("{} {}/{}{}", &caps[1], root_dir, &caps[2], &caps[3])
        })
        .into_owned()
}

/// Does the command need `/bin/sh -c` to behave?
fn needs_shell(s: &str) -> bool {
    if s.contains('>') || s.contains('|') || s.contains("&&") || s.contains(';') || s.contains(" & ")
    {
        return true;
    }
    if s.contains('"') || s.contains('\'') || s.contains('`') || s.contains('$') {
        return true;
    }
    let tokens: Vec<&str> = s.split_whitespace().collect();
    if tokens.iter().any(|t| SHELL_TOKENS.contains(t)) {
        return true;
    }
    if (s.starts_with("python ") || s.starts_with("python3 "))
        && tokens.iter().any(|t| *t == "-c" || *t == "-m")
    {
        return true;
    }
    false
}

/// Wrap in `/bin/sh -c '...'`, escaping embedded single quotes as `'\''`.
fn wrap(inner: &str) -> String {
    format!("{SHELL_WRAP_PREFIX} '{}'", inner.replace('\'', "'\\''"))
}

/// `python -c '<code>'` loses its quoting when re-split remotely; normalize
/// to python3 with the code in double quotes inside a wrapped shell string.
fn rewrite_python_inline(s: &str) -> Option<String> {
    let caps = PYTHON_INLINE_RE.captures(s)?;
    let code = strip_outer_quotes(caps.get(1)?.as_str());
    let escaped = code
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$");
    Some(wrap(&format!("python3 -c \"{escaped}\"")))
}

/// The remote has no reliable `timeout` binary; emulate with a background
/// run, a sleep, and a kill.
fn rewrite_timeout(s: &str) -> Option<String> {
    let caps = TIMEOUT_RE.captures(s)?;
    let seconds = caps.get(1)?.as_str();
    let rest = caps.get(2)?.as_str();
    Some(wrap(&format!(
        "{rest} & pid=$!; sleep {seconds}; kill $pid 2>/dev/null || true; wait $pid 2>/dev/null || true"
    )))
}

fn rewrite_sleep(s: &str) -> Option<String> {
    let caps = SLEEP_RE.captures(s)?;
    Some(wrap(&format!("sleep {}", caps.get(1)?.as_str())))
}

fn rewrite_nohup(s: &str) -> Option<String> {
    let caps = NOHUP_RE.captures(s)?;
    Some(wrap(&format!("nohup {}", caps.get(1)?.as_str())))
}

/// Foreground server launches block the RPC and return nothing; background
/// them, capture the PID, and leave the output in a log file.
fn rewrite_server_launch(s: &str) -> Option<String> {
    if !is_server_launch(s) || s.contains(" & ") || s.ends_with('&') {
        return None;
    }
    let last = s.split_whitespace().last().unwrap_or_default();
    let cd = if last.ends_with(".py") {
        format!("cd $(dirname {last}); ")
    } else {
        String::new()
    };
    Some(wrap(&format!(
        "{cd}nohup {s} > flask.log 2>&1 & echo \"Flask app started with PID: $!\""
    )))
}

fn is_server_launch(s: &str) -> bool {
    if s.contains("flask run") {
        return true;
    }
    (s.starts_with("python ") || s.starts_with("python3 "))
        && s.split_whitespace()
            .last()
            .is_some_and(|arg| arg.ends_with("app.py"))
}

fn strip_outer_quotes(s: &str) -> &str {
    let s = s.trim();
    for quote in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
