use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Unsupported storage engine '{engine}'. Supported: {supported}")]
    UnsupportedStorage { engine: String, supported: String },
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Bounds for a numeric setting such as the handle limit
pub struct RangeValidator {
    pub field: &'static str,
    pub min: u32,
    pub max: u32,
}

impl ConfigValidator<u32> for RangeValidator {
    fn validate(&self, value: &u32) -> Result<(), ConfigError> {
        if *value < self.min || *value > self.max {
            return Err(ConfigError::invalid_value(
                self.field,
                value.to_string(),
                format!("value between {} and {}", self.min, self.max),
            ));
        }
        Ok(())
    }
}

/// Non-empty string validator
pub struct NonEmptyValidator {
    pub field: &'static str,
}

impl ConfigValidator<String> for NonEmptyValidator {
    fn validate(&self, value: &String) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::missing_required(
                self.field,
                "Provide a non-empty value",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_validator() {
        let validator = RangeValidator {
            field: "max_handles",
            min: 1,
            max: 10,
        };
        assert!(validator.validate(&1).is_ok());
        assert!(validator.validate(&10).is_ok());

        let err = validator.validate(&0).unwrap_err();
        assert!(err.to_string().contains("max_handles"));
        assert!(validator.validate(&11).is_err());
    }

    #[test]
    fn test_non_empty_validator() {
        let validator = NonEmptyValidator { field: "username" };
        assert!(validator.validate(&"admin".to_string()).is_ok());
        assert!(matches!(
            validator.validate(&"   ".to_string()),
            Err(ConfigError::MissingRequired { .. })
        ));
    }
}
