//! Configuration validation

use super::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration objects
pub trait Validatable {
    /// Returns `Ok(())` if valid, `Err(ConfigError)` with details if invalid.
    fn validate(&self) -> ConfigResult<()>;

    /// Configuration name for error messages
    fn config_name(&self) -> &'static str {
        "Config"
    }
}

/// Range check for a strictly positive, finite float field
pub(crate) fn check_positive(field: &str, value: f64, max: f64, hint: &str) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 && value <= max {
        Ok(())
    } else {
        Err(ConfigError::not_positive_with_hint(field, value, max, hint))
    }
}

/// Range check for a non-negative, finite float field
pub(crate) fn check_non_negative(
    field: &str,
    value: f64,
    max: f64,
    hint: &str,
) -> ConfigResult<()> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::range_with_hint(field, value, 0, max, hint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_positive() {
        assert!(check_positive("x", 0.5, 10.0, "").is_ok());
        assert!(check_positive("x", 0.0, 10.0, "").is_err());
        assert!(check_positive("x", f64::NAN, 10.0, "").is_err());
        assert!(check_positive("x", 11.0, 10.0, "").is_err());

        let msg = check_positive("x", 0.0, 10.0, "").unwrap_err().to_string();
        assert!(msg.contains("0 not in (0, 10]"));
    }

    #[test]
    fn test_check_non_negative() {
        assert!(check_non_negative("w", 0.0, 1.0, "").is_ok());
        assert!(check_non_negative("w", -0.1, 1.0, "").is_err());
        assert!(check_non_negative("w", f64::INFINITY, 1.0, "").is_err());
    }
}
