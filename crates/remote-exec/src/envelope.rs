//! Tool-call output envelope shared with the embedding assistant.
//!
//! Exec and patch results cross the tool-call boundary as JSON of the
//! shape `{"output": ..., "metadata": {"exit_code", "duration_seconds",
//! "error"?}}`. Decoding is lenient: a raw patch echo is recognized by
//! prefix and treated as success, anything else decodes to a parse
//! failure rather than an error.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ExecResult;

const PATCH_ECHO_PREFIXES: &[&str] = &["*** Begin Patch", "*** Add File:", "Created "];
const PARSE_FAILURE_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEnvelope {
    pub output: String,
    pub metadata: ToolCallMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallMetadata {
    pub exit_code: i32,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serialize a result for the outer assistant.
pub fn encode(result: &ExecResult, duration: Duration) -> String {
    let envelope = ToolCallEnvelope {
        output: result.stdout.clone(),
        metadata: ToolCallMetadata {
            exit_code: result.exit_code,
            duration_seconds: duration.as_secs_f64(),
            error: (!result.stderr.is_empty()).then(|| result.stderr.clone()),
        },
    };
    serde_json::to_string(&envelope).unwrap_or_else(|_| envelope.output)
}

/// Decode a tool-call payload produced by this core (or echoed raw).
pub fn decode(raw: &str) -> ToolCallEnvelope {
    if let Ok(envelope) = serde_json::from_str::<ToolCallEnvelope>(raw) {
        return envelope;
    }
    if PATCH_ECHO_PREFIXES
        .iter()
        .any(|prefix| raw.starts_with(prefix))
    {
        return ToolCallEnvelope {
            output: raw.to_string(),
            metadata: ToolCallMetadata {
                exit_code: 0,
                duration_seconds: 0.0,
                error: None,
            },
        };
    }
    let preview: String = raw.chars().take(PARSE_FAILURE_PREVIEW_CHARS).collect();
    ToolCallEnvelope {
        output: format!("Failed to parse output: {preview}…"),
        metadata: ToolCallMetadata {
            exit_code: 1,
            duration_seconds: 0.0,
            error: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_shape() {
        let result = ExecResult {
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
        };
        let raw = encode(&result, Duration::from_millis(1500));
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(value["output"], "hello\n");
        assert_eq!(value["metadata"]["exit_code"], 0);
        assert_eq!(value["metadata"]["duration_seconds"], 1.5);
        assert!(value["metadata"].get("error").is_none());
    }

    #[test]
    fn test_encode_carries_stderr_as_error() {
        let result = ExecResult::failure("boom");
        let raw = encode(&result, Duration::ZERO);
        let envelope = decode(&raw);
        assert_eq!(envelope.metadata.exit_code, 1);
        assert_eq!(envelope.metadata.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_decode_round_trip() {
        let result = ExecResult {
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            exit_code: 3,
        };
        let envelope = decode(&encode(&result, Duration::from_secs(2)));
        assert_eq!(envelope.output, "out");
        assert_eq!(envelope.metadata.exit_code, 3);
    }

    #[test]
    fn test_decode_recognizes_patch_echo() {
        for raw in [
            "*** Begin Patch\n*** Add File: a\n*** End Patch",
            "*** Add File: b.txt",
            "Created hello.py\n",
        ] {
            let envelope = decode(raw);
            assert_eq!(envelope.metadata.exit_code, 0, "raw: {raw}");
            assert_eq!(envelope.output, raw);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let long = "x".repeat(300);
        let envelope = decode(&long);
        assert_eq!(envelope.metadata.exit_code, 1);
        assert!(envelope.output.starts_with("Failed to parse output: "));
        // 100 chars of preview plus the prefix and ellipsis.
        assert!(envelope.output.chars().count() <= 24 + 100 + 1);
    }
}
