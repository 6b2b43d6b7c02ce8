use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub cors_enabled: bool,
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
            request_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for ApiConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.bind_address, "api.bind_address")?;
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(crate::ConfigError::Validation(format!(
                "api.bind_address is not a valid socket address: {}",
                self.bind_address
            )));
        }
        ValidationUtils::validate_timeout_seconds(
            self.request_timeout_seconds,
            "api.request_timeout_seconds",
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {s}. Valid formats: json, pretty")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_endpoint: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
            metrics_endpoint: "/metrics".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(crate::ConfigError::Validation(format!(
                "Invalid log level: {}. Valid levels: {:?}",
                self.log_level, valid_levels
            )));
        }
        if self.metrics_enabled && !self.metrics_endpoint.starts_with('/') {
            return Err(crate::ConfigError::Validation(
                "observability.metrics_endpoint must start with '/'".to_string(),
            ));
        }
        Ok(())
    }
}
