//! Configuration error types

use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Range validation error
    #[error("Invalid range for field '{field}': {value} not in {min}..={max}. {hint}")]
    Range {
        field: String,
        value: String,
        min: String,
        max: String,
        hint: String,
    },

    /// Value must lie in the half-open interval (0, max]
    #[error("Invalid range for field '{field}': {value} not in (0, {max}]. {hint}")]
    NotPositive {
        field: String,
        value: String,
        max: String,
        hint: String,
    },

    /// Missing version field in YAML
    #[error("Missing 'version' field in configuration file. Add 'version: 1' to the top of your YAML file.")]
    MissingVersion,

    /// Unsupported version
    #[error("Unsupported configuration version {found}. Supported versions: {}", supported.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))]
    UnsupportedVersion { found: u32, supported: Vec<u32> },

    /// Unknown preset name
    #[error("Unknown preset '{0}'. Valid presets: interactive, strict, lenient")]
    UnknownPreset(String),

    /// Environment override could not be parsed
    #[error("Invalid value '{value}' for environment variable {var}: expected {expected}")]
    InvalidEnv {
        var: String,
        value: String,
        expected: &'static str,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Create a range error with a hint
    pub fn range_with_hint(
        field: impl Into<String>,
        value: impl ToString,
        min: impl ToString,
        max: impl ToString,
        hint: impl Into<String>,
    ) -> Self {
        Self::Range {
            field: field.into(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
            hint: hint.into(),
        }
    }

    /// Create an error for a value outside (0, max]
    pub fn not_positive_with_hint(
        field: impl Into<String>,
        value: impl ToString,
        max: impl ToString,
        hint: impl Into<String>,
    ) -> Self {
        Self::NotPositive {
            field: field.into(),
            value: value.to_string(),
            max: max.to_string(),
            hint: hint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let err = ConfigError::range_with_hint(
            "checkpoint_interval",
            0,
            1,
            10000,
            "A checkpoint needs at least one feature",
        );

        let msg = err.to_string();
        assert!(msg.contains("checkpoint_interval"));
        assert!(msg.contains("1..=10000"));
        assert!(msg.contains("at least one feature"));
    }

    #[test]
    fn test_not_positive_formatting() {
        let err = ConfigError::not_positive_with_hint(
            "drift_threshold",
            0,
            100,
            "Use a small positive distance",
        );
        let msg = err.to_string();
        assert!(msg.contains("not in (0, 100]"));
        assert!(msg.contains("small positive distance"));
    }

    #[test]
    fn test_unsupported_version_error() {
        let err = ConfigError::UnsupportedVersion {
            found: 2,
            supported: vec![1],
        };

        let msg = err.to_string();
        assert!(msg.contains("version 2"));
        assert!(msg.contains("Supported versions: 1"));
    }

    #[test]
    fn test_unknown_preset_error() {
        let err = ConfigError::UnknownPreset("paranoid".to_string());
        let msg = err.to_string();
        assert!(msg.contains("paranoid"));
        assert!(msg.contains("interactive, strict, lenient"));
    }

    #[test]
    fn test_invalid_env_error() {
        let err = ConfigError::InvalidEnv {
            var: "SHAPEGRAPH__STRICT_MODE".to_string(),
            value: "maybe".to_string(),
            expected: "a boolean",
        };
        assert!(err.to_string().contains("SHAPEGRAPH__STRICT_MODE"));
    }
}
