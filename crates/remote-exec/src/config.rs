//! Environment contract for the workspace provider.

use crate::error::{Result, SandboxError};

pub const ENV_API_KEY: &str = "DAYTONA_API_KEY";
pub const ENV_API_URL: &str = "DAYTONA_API_URL";
pub const ENV_TARGET: &str = "DAYTONA_TARGET";
pub const ENV_AUTO_STOP: &str = "DAYTONA_AUTO_STOP_INTERVAL";
pub const ENV_SNAPSHOT: &str = "DAYTONA_SNAPSHOT";
pub const ENV_ORGANIZATION_ID: &str = "DAYTONA_ORGANIZATION_ID";

pub const DEFAULT_TARGET: &str = "us";
pub const DEFAULT_AUTO_STOP_MINUTES: i32 = 30;
pub const DEFAULT_SNAPSHOT: &str = "daytonaio/sandbox:latest";

/// Provider configuration, usually read from the environment.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub api_key: String,
    pub api_url: Option<String>,
    pub target: String,
    /// Minutes of idleness before the provider stops the workspace; 0 disables.
    pub auto_stop_minutes: i32,
    pub snapshot: String,
    pub organization_id: Option<String>,
}

impl SandboxConfig {
    /// Configuration with defaults for everything but the API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: None,
            target: DEFAULT_TARGET.to_string(),
            auto_stop_minutes: DEFAULT_AUTO_STOP_MINUTES,
            snapshot: DEFAULT_SNAPSHOT.to_string(),
            organization_id: None,
        }
    }

    /// Read the `DAYTONA_*` environment contract.
    ///
    /// `DAYTONA_API_KEY` is required; everything else falls back to a
    /// default. Unparseable auto-stop values fall back rather than fail.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| SandboxError::Config(format!("{ENV_API_KEY} is not set")))?;
        let config = Self {
            api_key,
            api_url: std::env::var(ENV_API_URL).ok(),
            target: std::env::var(ENV_TARGET).unwrap_or_else(|_| DEFAULT_TARGET.to_string()),
            auto_stop_minutes: parse_env_i32(ENV_AUTO_STOP).unwrap_or(DEFAULT_AUTO_STOP_MINUTES),
            snapshot: std::env::var(ENV_SNAPSHOT).unwrap_or_else(|_| DEFAULT_SNAPSHOT.to_string()),
            organization_id: std::env::var(ENV_ORGANIZATION_ID).ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the initialization sequence relies on.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_api_key(&self.api_key) {
            return Err(SandboxError::Config(format!(
                "{ENV_API_KEY} must be non-empty and contain only [A-Za-z0-9_-.]"
            )));
        }
        if self.auto_stop_minutes < 0 {
            return Err(SandboxError::Config(format!(
                "{ENV_AUTO_STOP} must be a non-negative number of minutes"
            )));
        }
        Ok(())
    }
}

fn parse_env_i32(name: &str) -> Option<i32> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

fn is_valid_api_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_api_key_charset() {
        assert!(is_valid_api_key("dtn_01ABC.xyz-9"));
        assert!(!is_valid_api_key(""));
        assert!(!is_valid_api_key("key with spaces"));
        assert!(!is_valid_api_key("key$injection"));
        assert!(!is_valid_api_key("key\nnewline"));
    }

    #[test]
    fn test_validate_rejects_bad_key() {
        let mut config = SandboxConfig::new("ok-key");
        assert!(config.validate().is_ok());
        config.api_key = "not ok".to_string();
        assert!(matches!(config.validate(), Err(SandboxError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_negative_auto_stop() {
        let mut config = SandboxConfig::new("ok-key");
        config.auto_stop_minutes = -1;
        assert!(matches!(config.validate(), Err(SandboxError::Config(_))));
    }

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::new("k");
        assert_eq!(config.target, "us");
        assert_eq!(config.auto_stop_minutes, 30);
        assert_eq!(config.snapshot, "daytonaio/sandbox:latest");
    }
}
