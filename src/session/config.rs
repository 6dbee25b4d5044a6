//! Session configuration.
//!
//! The settle delay before the first repeating preview request is a
//! workaround for sessions that report "configured" before they accept
//! repeating requests. It is a heuristic, not a guarantee; if the
//! hardware offers a confirmed-ready callback, gate on that instead.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capabilities::SizePolicy;

/// Settle delay used when none is configured.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(400);

/// Upper bound on the settle delay.
const MAX_SETTLE_DELAY_MS: u64 = 10_000;

/// Auto-focus behaviour attached to capture requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusPolicy {
    /// No auto-focus mode on requests.
    #[default]
    Fixed,
    /// Continuous auto-focus on preview and still requests.
    ContinuousAuto,
}

/// Configuration for one camera session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay between session configuration and the first repeating request.
    pub settle_delay_ms: u64,
    /// Directory receiving captured stills.
    pub output_dir: PathBuf,
    /// Still output size selection.
    pub size_policy: SizePolicy,
    /// Auto-focus handling.
    pub focus_policy: FocusPolicy,
    /// Fixed rotation for the orientation tag; derived from the sensor when unset.
    pub rotation_degrees: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY.as_millis() as u64,
            output_dir: PathBuf::from("captures"),
            size_policy: SizePolicy::LargestArea,
            focus_policy: FocusPolicy::Fixed,
            rotation_degrees: None,
        }
    }
}

impl SessionConfig {
    /// Creates a configuration writing into `output_dir`.
    pub fn with_output_dir(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// The settle delay as a [`Duration`].
    #[inline]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settle_delay_ms > MAX_SETTLE_DELAY_MS {
            return Err(ConfigError::InvalidSettleDelay);
        }
        if let SizePolicy::PreferFixed { preferred, display } = &self.size_policy {
            let zero = |w: u32, h: u32| w == 0 || h == 0;
            if zero(preferred.width, preferred.height)
                || display.is_some_and(|d| zero(d.width, d.height))
            {
                return Err(ConfigError::InvalidPreferredSize);
            }
        }
        if let Some(rotation) = self.rotation_degrees {
            if ![0, 90, 180, 270].contains(&rotation) {
                return Err(ConfigError::InvalidRotation(rotation));
            }
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("settle delay must be at most 10000 ms")]
    InvalidSettleDelay,
    #[error("preferred and display sizes must be non-zero")]
    InvalidPreferredSize,
    #[error("rotation must be 0, 90, 180 or 270 (got {0})")]
    InvalidRotation(u32),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[session]` table.
    #[serde(default)]
    pub session: SessionConfig,
    /// `[output]` table.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output configuration for the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Camera to open.
    pub camera: String,
    /// Number of stills to take if not continuous.
    pub captures: u32,
    /// Pause between stills.
    pub interval_ms: u64,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            camera: "0".to_string(),
            captures: 3,
            interval_ms: 500,
            metrics_port: 9090,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.session.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Size;

    #[test]
    fn test_default_config_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.settle_delay(), DEFAULT_SETTLE_DELAY);
    }

    #[test]
    fn test_bad_rotation_invalid() {
        let config = SessionConfig {
            rotation_degrees: Some(45),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRotation(45))
        ));
    }

    #[test]
    fn test_zero_preferred_size_invalid() {
        let config = SessionConfig {
            size_policy: SizePolicy::PreferFixed {
                preferred: Size::new(0, 1080),
                display: None,
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPreferredSize)
        ));
    }

    #[test]
    fn test_parse_toml() {
        let config = FileConfig::from_toml(
            r#"
            [session]
            settle_delay_ms = 250
            output_dir = "/tmp/shots"
            focus_policy = "continuous_auto"
            size_policy = { kind = "prefer_fixed", preferred = { width = 1920, height = 1080 } }

            [output]
            camera = "1"
            captures = 5
            interval_ms = 100
            metrics_port = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.session.settle_delay(), Duration::from_millis(250));
        assert_eq!(config.session.focus_policy, FocusPolicy::ContinuousAuto);
        assert_eq!(
            config.session.size_policy,
            SizePolicy::PreferFixed {
                preferred: Size::new(1920, 1080),
                display: None
            }
        );
        assert_eq!(config.output.camera, "1");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = FileConfig::from_toml("").unwrap();
        assert_eq!(config.session.settle_delay(), DEFAULT_SETTLE_DELAY);
        assert_eq!(config.output.captures, 3);
    }

    #[test]
    fn test_parse_error_reported() {
        assert!(matches!(
            FileConfig::from_toml("[session]\nsettle_delay_ms = \"soon\""),
            Err(ConfigError::ParseError(_))
        ));
    }
}
