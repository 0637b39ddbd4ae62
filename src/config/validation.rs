use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("dispatcher.max_workers must be at least 1")]
    InvalidMaxWorkers,

    #[error("Timeout must be positive: {field}")]
    InvalidTimeout { field: &'static str },

    #[error("http.user_agent must not be empty")]
    EmptyUserAgent,

    #[error("http.max_body_bytes must be positive")]
    InvalidMaxBodyBytes,

    #[error("Invalid telemetry.log_filter '{filter}': {reason}")]
    InvalidLogFilter { filter: String, reason: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_dispatcher(config)?;
    validate_http(config)?;
    validate_telemetry(config)?;
    Ok(())
}

fn validate_dispatcher(config: &Config) -> Result<(), ValidationError> {
    if config.dispatcher.max_workers == 0 {
        return Err(ValidationError::InvalidMaxWorkers);
    }
    Ok(())
}

fn validate_http(config: &Config) -> Result<(), ValidationError> {
    let http = &config.http;

    if http.connect_timeout_ms == 0 {
        return Err(ValidationError::InvalidTimeout {
            field: "http.connect_timeout_ms",
        });
    }
    if http.request_timeout_ms == 0 {
        return Err(ValidationError::InvalidTimeout {
            field: "http.request_timeout_ms",
        });
    }
    if http.user_agent.trim().is_empty() {
        return Err(ValidationError::EmptyUserAgent);
    }
    if http.max_body_bytes.as_u64() == 0 {
        return Err(ValidationError::InvalidMaxBodyBytes);
    }
    Ok(())
}

fn validate_telemetry(config: &Config) -> Result<(), ValidationError> {
    let filter = &config.telemetry.log_filter;
    tracing_subscriber::EnvFilter::try_new(filter).map_err(|e| {
        ValidationError::InvalidLogFilter {
            filter: filter.clone(),
            reason: e.to_string(),
        }
    })?;
    Ok(())
}
