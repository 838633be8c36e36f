//! Preset configurations
//!
//! Presets provide complete default configurations for common document kinds.

use serde::{Deserialize, Serialize};

/// Configuration preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Interactive modeling: geometric fallback allowed, checkpoint every 5 features
    Interactive,

    /// Strict documents: fallback tiers disabled, self-heal drift check on
    Strict,

    /// Imported/legacy documents: sparser checkpoints, looser matching
    Lenient,
}

impl Preset {
    /// Parse preset from string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            _ => Err(format!(
                "Unknown preset '{}'. Valid presets: interactive, strict, lenient",
                s
            )),
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Strict => "strict",
            Self::Lenient => "lenient",
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Self::Interactive
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_parsing() {
        assert_eq!(Preset::from_str("strict").unwrap(), Preset::Strict);
        assert_eq!(Preset::from_str("STRICT").unwrap(), Preset::Strict);
        assert_eq!(Preset::from_str("interactive").unwrap(), Preset::Interactive);
        assert_eq!(Preset::from_str("lenient").unwrap(), Preset::Lenient);
        assert!(Preset::from_str("fast").is_err());
    }

    #[test]
    fn test_preset_display() {
        assert_eq!(Preset::Interactive.to_string(), "interactive");
        assert_eq!(Preset::Strict.to_string(), "strict");
    }

    #[test]
    fn test_default_preset() {
        assert_eq!(Preset::default(), Preset::Interactive);
    }
}
