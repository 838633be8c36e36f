//! Engine configuration
//!
//! Three levels, same as every other configurable piece of the workspace:
//! - Preset: `EngineConfig::preset(Preset::Strict)`
//! - Builder overrides: `.checkpoint_interval(8).strict_mode(true)`
//! - YAML schema v1 (`version: 1`, base preset, optional overrides)
//!
//! Environment variables (`SHAPEGRAPH__STRICT_MODE`,
//! `SHAPEGRAPH__CHECKPOINT_INTERVAL`) are applied last by
//! [`EngineConfig::with_env_overrides`].

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use super::validation::{check_non_negative, check_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 5;
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.5;

const ENV_STRICT_MODE: &str = "SHAPEGRAPH__STRICT_MODE";
const ENV_CHECKPOINT_INTERVAL: &str = "SHAPEGRAPH__CHECKPOINT_INTERVAL";

/// Geometric selector scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorConfig {
    /// Maximum accepted weighted score
    pub tolerance: f64,
    /// Weight per model unit of center distance
    pub center_weight: f64,
    /// Weight of `1 - |cos|` between normals/directions
    pub alignment_weight: f64,
    /// Weight of `1 - min/max` between areas/lengths
    pub size_weight: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            center_weight: 1.0,
            alignment_weight: 2.0,
            size_weight: 1.0,
        }
    }
}

impl Validatable for SelectorConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_positive(
            "selector.tolerance",
            self.tolerance,
            1e6,
            "A zero tolerance rejects every candidate",
        )?;
        check_non_negative("selector.center_weight", self.center_weight, 1e6, "")?;
        check_non_negative("selector.alignment_weight", self.alignment_weight, 1e6, "")?;
        check_non_negative("selector.size_weight", self.size_weight, 1e6, "")?;
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "SelectorConfig"
    }
}

/// Bounds for the strict-mode self-heal drift check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriftPolicy {
    /// |Δvolume| / max(volume_before, volume_after)
    pub max_volume_change_ratio: f64,
    /// Growth of the bounding-box diagonal relative to the pre-op diagonal
    pub max_bbox_growth_ratio: f64,
    /// Absolute change in face count
    pub max_face_count_delta: usize,
}

impl Default for DriftPolicy {
    fn default() -> Self {
        Self {
            max_volume_change_ratio: 0.5,
            max_bbox_growth_ratio: 0.25,
            max_face_count_delta: 64,
        }
    }
}

impl Validatable for DriftPolicy {
    fn validate(&self) -> ConfigResult<()> {
        check_positive(
            "drift_policy.max_volume_change_ratio",
            self.max_volume_change_ratio,
            1.0,
            "Ratio of the larger volume, so at most 1.0",
        )?;
        check_positive(
            "drift_policy.max_bbox_growth_ratio",
            self.max_bbox_growth_ratio,
            1e3,
            "",
        )?;
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "DriftPolicy"
    }
}

/// Per-document engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub preset: Preset,
    /// Checkpoint after feature `i` when `(i + 1) % interval == 0`
    pub checkpoint_interval: usize,
    /// Disables fallback/local-index resolution and enables the drift check
    pub strict_mode: bool,
    /// History-tier soft threshold on fingerprint distance (success, flagged)
    pub drift_threshold: f64,
    pub selector: SelectorConfig,
    pub drift_policy: DriftPolicy,
}

impl EngineConfig {
    /// Complete defaults for a preset
    pub fn preset(preset: Preset) -> Self {
        let base = Self {
            preset,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            strict_mode: false,
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            selector: SelectorConfig::default(),
            drift_policy: DriftPolicy::default(),
        };

        match preset {
            Preset::Interactive => base,
            Preset::Strict => Self {
                strict_mode: true,
                ..base
            },
            Preset::Lenient => Self {
                checkpoint_interval: 10,
                drift_threshold: 1.0,
                selector: SelectorConfig {
                    tolerance: 2.0,
                    ..SelectorConfig::default()
                },
                ..base
            },
        }
    }

    pub fn checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn drift_threshold(mut self, threshold: f64) -> Self {
        self.drift_threshold = threshold;
        self
    }

    pub fn selector(mut self, f: impl FnOnce(SelectorConfig) -> SelectorConfig) -> Self {
        self.selector = f(self.selector);
        self
    }

    pub fn drift_policy(mut self, f: impl FnOnce(DriftPolicy) -> DriftPolicy) -> Self {
        self.drift_policy = f(self.drift_policy);
        self
    }

    /// Load from a YAML file (schema v1)
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        match file.version {
            None => return Err(ConfigError::MissingVersion),
            Some(CONFIG_VERSION) => {}
            Some(found) => {
                return Err(ConfigError::UnsupportedVersion {
                    found,
                    supported: vec![CONFIG_VERSION],
                })
            }
        }

        let preset = Preset::from_str(&file.preset)
            .map_err(|_| ConfigError::UnknownPreset(file.preset.clone()))?;
        let mut config = Self::preset(preset);
        if let Some(overrides) = file.overrides {
            overrides.apply(&mut config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Export as YAML v1 with every field written out as an override
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(CONFIG_VERSION),
            preset: self.preset.as_str().to_string(),
            overrides: Some(EngineOverrides {
                checkpoint_interval: Some(self.checkpoint_interval),
                strict_mode: Some(self.strict_mode),
                drift_threshold: Some(self.drift_threshold),
                selector: Some(self.selector),
                drift_policy: Some(self.drift_policy),
            }),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// Apply `SHAPEGRAPH__*` variables from the process environment
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply `SHAPEGRAPH__*` overrides from an arbitrary lookup
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<Self> {
        if let Some(raw) = lookup(ENV_STRICT_MODE) {
            self.strict_mode = match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: ENV_STRICT_MODE.to_string(),
                        value: raw,
                        expected: "a boolean",
                    })
                }
            };
        }

        if let Some(raw) = lookup(ENV_CHECKPOINT_INTERVAL) {
            self.checkpoint_interval =
                raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: ENV_CHECKPOINT_INTERVAL.to_string(),
                    value: raw.clone(),
                    expected: "a positive integer",
                })?;
        }

        self.validate()?;
        Ok(self)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::preset(Preset::default())
    }
}

impl Validatable for EngineConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !(1..=10_000).contains(&self.checkpoint_interval) {
            return Err(ConfigError::range_with_hint(
                "checkpoint_interval",
                self.checkpoint_interval,
                1,
                10_000,
                "A checkpoint needs at least one feature",
            ));
        }
        check_positive(
            "drift_threshold",
            self.drift_threshold,
            1e6,
            "Fingerprint distance in model units",
        )?;
        self.selector.validate()?;
        self.drift_policy.validate()?;
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "EngineConfig"
    }
}

/// YAML schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    version: Option<u32>,

    #[serde(default = "default_preset_name")]
    preset: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    overrides: Option<EngineOverrides>,
}

fn default_preset_name() -> String {
    Preset::default().as_str().to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checkpoint_interval: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    strict_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    drift_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<SelectorConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    drift_policy: Option<DriftPolicy>,
}

impl EngineOverrides {
    fn apply(self, config: &mut EngineConfig) {
        if let Some(v) = self.checkpoint_interval {
            config.checkpoint_interval = v;
        }
        if let Some(v) = self.strict_mode {
            config.strict_mode = v;
        }
        if let Some(v) = self.drift_threshold {
            config.drift_threshold = v;
        }
        if let Some(v) = self.selector {
            config.selector = v;
        }
        if let Some(v) = self.drift_policy {
            config.drift_policy = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_presets() {
        let interactive = EngineConfig::preset(Preset::Interactive);
        assert_eq!(interactive.checkpoint_interval, 5);
        assert!(!interactive.strict_mode);

        let strict = EngineConfig::preset(Preset::Strict);
        assert!(strict.strict_mode);

        let lenient = EngineConfig::preset(Preset::Lenient);
        assert_eq!(lenient.checkpoint_interval, 10);
        assert!(lenient.selector.tolerance > interactive.selector.tolerance);

        for config in [interactive, strict, lenient] {
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_builder_overrides() {
        let config = EngineConfig::default()
            .checkpoint_interval(3)
            .strict_mode(true)
            .selector(|s| SelectorConfig {
                tolerance: 0.25,
                ..s
            });
        assert_eq!(config.checkpoint_interval, 3);
        assert!(config.strict_mode);
        assert_eq!(config.selector.tolerance, 0.25);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = EngineConfig::default()
            .checkpoint_interval(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("checkpoint_interval"));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = EngineConfig::preset(Preset::Strict).checkpoint_interval(7);
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("preset: strict"));
        assert!(yaml.contains("checkpoint_interval: 7"));

        let loaded = EngineConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_yaml_file_loading() {
        let yaml_content = r#"
version: 1
preset: lenient
overrides:
  strict_mode: true
  drift_threshold: 0.2
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = EngineConfig::from_yaml(temp_file.path()).unwrap();
        assert_eq!(config.preset, Preset::Lenient);
        assert_eq!(config.checkpoint_interval, 10);
        assert!(config.strict_mode);
        assert_eq!(config.drift_threshold, 0.2);
    }

    #[test]
    fn test_yaml_missing_version() {
        let result = EngineConfig::from_yaml_str("preset: strict\n");
        assert!(matches!(result, Err(ConfigError::MissingVersion)));
    }

    #[test]
    fn test_yaml_unsupported_version() {
        let result = EngineConfig::from_yaml_str("version: 2\npreset: strict\n");
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_yaml_unknown_preset() {
        let result = EngineConfig::from_yaml_str("version: 1\npreset: turbo\n");
        assert!(matches!(result, Err(ConfigError::UnknownPreset(p)) if p == "turbo"));
    }

    #[test]
    fn test_yaml_unknown_field_rejected() {
        let result = EngineConfig::from_yaml_str("version: 1\noverrides:\n  interval: 3\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SHAPEGRAPH__STRICT_MODE", "yes"),
            ("SHAPEGRAPH__CHECKPOINT_INTERVAL", " 9 "),
        ]);
        let config = EngineConfig::default()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(config.strict_mode);
        assert_eq!(config.checkpoint_interval, 9);
    }

    #[test]
    fn test_env_override_invalid() {
        let result = EngineConfig::default().with_overrides_from(|k| {
            (k == "SHAPEGRAPH__STRICT_MODE").then(|| "perhaps".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }
}
