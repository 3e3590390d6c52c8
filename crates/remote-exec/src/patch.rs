//! Minimal add/delete patch grammar and its application.
//!
//! A patch is fenced by `*** Begin Patch` / `*** End Patch`. Inside,
//! `*** Add File: <path>` opens a block of `+` lines, `*** Delete File:
//! <path>` is a standalone directive, and `*** End of File` or
//! `*** Update File: <path>` terminate an open add (update carries no
//! other semantics here).

use std::fmt::Write as _;

use thiserror::Error;
use tracing::debug;

use daytona::ExecuteRequest;

use crate::paths::{parent_dir, PathMapper};
use crate::provider::WorkspaceProvider;

pub const BEGIN_PATCH_MARKER: &str = "*** Begin Patch";
pub const END_PATCH_MARKER: &str = "*** End Patch";
const ADD_FILE_MARKER: &str = "*** Add File: ";
const DELETE_FILE_MARKER: &str = "*** Delete File: ";
const UPDATE_FILE_MARKER: &str = "*** Update File: ";
const END_OF_FILE_MARKER: &str = "*** End of File";

/// One operation parsed out of a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    Add { path: String, content: String },
    Delete { path: String },
}

/// Malformed patch fencing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchParseError {
    #[error("patch must start with '{BEGIN_PATCH_MARKER}'")]
    MissingBegin,
    #[error("patch must end with '{END_PATCH_MARKER}'")]
    MissingEnd,
}

/// Parse a patch into its operations.
pub fn parse_patch(text: &str) -> Result<Vec<PatchOp>, PatchParseError> {
    let lines: Vec<&str> = text.trim().lines().collect();
    if lines.first().map(|l| l.trim_end()) != Some(BEGIN_PATCH_MARKER) {
        return Err(PatchParseError::MissingBegin);
    }
    if lines.len() < 2 || lines.last().map(|l| l.trim_end()) != Some(END_PATCH_MARKER) {
        return Err(PatchParseError::MissingEnd);
    }

    let mut ops = Vec::new();
    let mut open_add: Option<(String, String)> = None;
    for line in &lines[1..lines.len() - 1] {
        if let Some(path) = line.strip_prefix(ADD_FILE_MARKER) {
            if let Some((path, content)) = open_add.take() {
                ops.push(PatchOp::Add { path, content });
            }
            open_add = Some((path.trim().to_string(), String::new()));
        } else if let Some(path) = line.strip_prefix(DELETE_FILE_MARKER) {
            if let Some((path, content)) = open_add.take() {
                ops.push(PatchOp::Add { path, content });
            }
            ops.push(PatchOp::Delete {
                path: path.trim().to_string(),
            });
        } else if line.trim_end() == END_OF_FILE_MARKER
            || line.strip_prefix(UPDATE_FILE_MARKER).is_some()
        {
            if let Some((path, content)) = open_add.take() {
                ops.push(PatchOp::Add { path, content });
            }
        } else if let Some(content_line) = line.strip_prefix('+') {
            if let Some((_, content)) = open_add.as_mut() {
                content.push_str(content_line);
                content.push('\n');
            }
        }
    }
    // An add still open at the closing fence is complete.
    if let Some((path, content)) = open_add.take() {
        ops.push(PatchOp::Add { path, content });
    }
    Ok(ops)
}

/// Apply parsed operations against the remote filesystem, returning the
/// per-file success log. Individual failures are reported in the log and
/// do not abort the rest of the patch.
pub(crate) async fn apply_ops(
    provider: &dyn WorkspaceProvider,
    sandbox_id: &str,
    mapper: &PathMapper,
    ops: &[PatchOp],
) -> String {
    let mut log = String::new();
    for op in ops {
        match op {
            PatchOp::Add { path, content } => {
                match apply_add(provider, sandbox_id, mapper, path, content).await {
                    Ok(line) => log.push_str(&line),
                    Err(err) => {
                        let _ = writeln!(log, "Error creating {path}: {err}");
                    }
                }
            }
            PatchOp::Delete { path } => {
                let remote = mapper.map(path);
                match provider.delete_file(sandbox_id, &remote).await {
                    Ok(()) => {
                        let _ = writeln!(log, "Deleted {path}");
                    }
                    Err(err) => {
                        let _ = writeln!(log, "Error deleting {path}: {err}");
                    }
                }
            }
        }
    }
    log
}

async fn apply_add(
    provider: &dyn WorkspaceProvider,
    sandbox_id: &str,
    mapper: &PathMapper,
    path: &str,
    content: &str,
) -> daytona::Result<String> {
    let remote = mapper.map(path);
    if let Some(parent) = parent_dir(&remote) {
        if let Err(err) = provider.create_folder(sandbox_id, &parent).await {
            debug!("parent mkdir for {remote} failed: {err}");
        }
    }
    provider
        .upload_file(sandbox_id, &remote, content.as_bytes())
        .await?;

    let verify = ExecuteRequest::new(format!(
        "test -f \"{remote}\" && echo exists || echo missing"
    ));
    let verified = match provider.execute(sandbox_id, &verify).await {
        Ok(response) => response.result.contains("exists"),
        Err(err) => {
            debug!("upload verification for {remote} failed: {err}");
            false
        }
    };
    if verified {
        return Ok(format!("Created {path}\n"));
    }

    // The upload endpoint occasionally writes nothing; shove the content
    // through the shell instead. echo restores the trailing newline.
    let escaped = content.trim_end_matches('\n').replace('\'', "'\\''");
    let fallback = ExecuteRequest::new(format!("echo '{escaped}' > \"{remote}\""));
    provider.execute(sandbox_id, &fallback).await?;
    Ok(format!("Created {path} (using echo fallback)\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_add_file() {
        let patch = "*** Begin Patch\n*** Add File: hello.py\n+print(\"hi\")\n*** End of File\n*** End Patch";
        let ops = parse_patch(patch).expect("well-formed");
        assert_eq!(
            ops,
            vec![PatchOp::Add {
                path: "hello.py".to_string(),
                content: "print(\"hi\")\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_add_without_eof_closes_at_fence() {
        let patch = "*** Begin Patch\n*** Add File: a.txt\n+one\n+two\n*** End Patch";
        let ops = parse_patch(patch).expect("well-formed");
        assert_eq!(
            ops,
            vec![PatchOp::Add {
                path: "a.txt".to_string(),
                content: "one\ntwo\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_empty_add_block_produces_empty_file() {
        let patch = "*** Begin Patch\n*** Add File: empty.txt\n*** End of File\n*** End Patch";
        let ops = parse_patch(patch).expect("well-formed");
        assert_eq!(
            ops,
            vec![PatchOp::Add {
                path: "empty.txt".to_string(),
                content: String::new(),
            }]
        );
    }

    #[test]
    fn test_delete_and_next_add_terminate_open_add() {
        let patch = concat!(
            "*** Begin Patch\n",
            "*** Add File: a.txt\n",
            "+alpha\n",
            "*** Add File: b.txt\n",
            "+beta\n",
            "*** Delete File: old.txt\n",
            "*** End Patch",
        );
        let ops = parse_patch(patch).expect("well-formed");
        assert_eq!(
            ops,
            vec![
                PatchOp::Add {
                    path: "a.txt".to_string(),
                    content: "alpha\n".to_string(),
                },
                PatchOp::Add {
                    path: "b.txt".to_string(),
                    content: "beta\n".to_string(),
                },
                PatchOp::Delete {
                    path: "old.txt".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_update_file_is_a_terminator_only() {
        let patch = concat!(
            "*** Begin Patch\n",
            "*** Add File: a.txt\n",
            "+alpha\n",
            "*** Update File: existing.txt\n",
            "+ignored\n",
            "*** End Patch",
        );
        let ops = parse_patch(patch).expect("well-formed");
        assert_eq!(
            ops,
            vec![PatchOp::Add {
                path: "a.txt".to_string(),
                content: "alpha\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_missing_begin_marker() {
        let err = parse_patch("*** Add File: a\n*** End Patch").expect_err("bad top");
        assert_eq!(err, PatchParseError::MissingBegin);
    }

    #[test]
    fn test_missing_end_marker() {
        let err = parse_patch("*** Begin Patch\n*** Add File: a\n+x").expect_err("bad bottom");
        assert_eq!(err, PatchParseError::MissingEnd);
    }

    #[test]
    fn test_plus_lines_outside_add_are_ignored() {
        let patch = "*** Begin Patch\n+stray\n*** Delete File: gone.txt\n*** End Patch";
        let ops = parse_patch(patch).expect("well-formed");
        assert_eq!(
            ops,
            vec![PatchOp::Delete {
                path: "gone.txt".to_string(),
            }]
        );
    }
}
