use crate::ConfigResult;

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a timeout is reasonable
    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> ConfigResult<()> {
        if timeout_seconds == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if timeout_seconds > 3600 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 3600"
            )));
        }
        Ok(())
    }

    /// Validate that a count lies in 1..=max
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> ConfigResult<()> {
        if count == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    /// Validate that a ratio lies in [0, 1]
    pub fn validate_ratio(value: f64, field_name: &str) -> ConfigResult<()> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be within [0, 1], got {value}"
            )));
        }
        Ok(())
    }

    /// Validate that a weight is finite and non-negative
    pub fn validate_weight(value: f64, field_name: &str) -> ConfigResult<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be a non-negative number, got {value}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("test", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("  test  ", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("", "field").is_err());
        assert!(ValidationUtils::validate_not_empty("   ", "field").is_err());
    }

    #[test]
    fn test_validate_timeout_seconds() {
        assert!(ValidationUtils::validate_timeout_seconds(30, "t").is_ok());
        assert!(ValidationUtils::validate_timeout_seconds(3600, "t").is_ok());
        assert!(ValidationUtils::validate_timeout_seconds(0, "t").is_err());
        assert!(ValidationUtils::validate_timeout_seconds(3601, "t").is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(ValidationUtils::validate_count(10, "test", 100).is_ok());
        assert!(ValidationUtils::validate_count(100, "test", 100).is_ok());
        assert!(ValidationUtils::validate_count(0, "test", 100).is_err());
        assert!(ValidationUtils::validate_count(101, "test", 100).is_err());
    }

    #[test]
    fn test_validate_ratio_and_weight() {
        assert!(ValidationUtils::validate_ratio(0.0, "r").is_ok());
        assert!(ValidationUtils::validate_ratio(1.0, "r").is_ok());
        assert!(ValidationUtils::validate_ratio(1.5, "r").is_err());
        assert!(ValidationUtils::validate_ratio(f64::NAN, "r").is_err());
        assert!(ValidationUtils::validate_weight(3.0, "w").is_ok());
        assert!(ValidationUtils::validate_weight(-0.1, "w").is_err());
    }
}
