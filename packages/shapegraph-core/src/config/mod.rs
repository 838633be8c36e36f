//! Engine configuration
//!
//! - Level 1: Preset (`interactive`, `strict`, `lenient`)
//! - Level 2: Builder overrides on [`EngineConfig`]
//! - Level 3: YAML schema v1, then `SHAPEGRAPH__*` environment overrides
//!
//! # Examples
//!
//! ```rust,ignore
//! use shapegraph_core::config::{EngineConfig, Preset};
//!
//! let config = EngineConfig::preset(Preset::Strict).checkpoint_interval(8);
//! let config = EngineConfig::from_yaml("model.shapegraph.yaml")?.with_env_overrides()?;
//! ```

pub mod engine_config;
pub mod error;
pub mod preset;
pub mod validation;

pub use engine_config::{
    DriftPolicy, EngineConfig, SelectorConfig, CONFIG_VERSION, DEFAULT_CHECKPOINT_INTERVAL,
    DEFAULT_DRIFT_THRESHOLD,
};
pub use error::{ConfigError, ConfigResult};
pub use preset::Preset;
pub use validation::Validatable;
