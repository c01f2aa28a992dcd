use crate::error::*;
use std::time::Duration;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    /// The wait the remote side asked for, if it named one.
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Bluesky(e) => {
                error!("Bluesky API error details: {:?}", e);
            }
            CoreError::Notifier(e) => {
                error!("Notifier error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Bluesky(e) => e.is_retryable(),
            CoreError::Notifier(e) => e.is_retryable(),
            CoreError::Network(e) => e.is_timeout() || e.is_connect(),
            CoreError::Timeout { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Bluesky(e) => e.retry_after(),
            CoreError::Notifier(e) => e.retry_after(),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Bluesky(e) => e.user_friendly_message(),
            CoreError::Notifier(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. Please try again.".to_string()
            }
            CoreError::NotFound { resource } => format!("Could not find: {}", resource),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Bluesky(_) => "BLUESKY_API".to_string(),
            CoreError::Notifier(_) => "NOTIFIER".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::NotFound { .. } => "NOT_FOUND".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for BlueskyApiError {
    fn log_error(&self) -> &Self {
        error!("BlueskyApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("BlueskyApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            BlueskyApiError::RateLimitExceeded { .. } => true,
            BlueskyApiError::RequestTimeout => true,
            BlueskyApiError::ServerError { status_code } => *status_code >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            BlueskyApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            BlueskyApiError::AuthenticationFailed { .. } => {
                "Bluesky authentication failed. Please check the app password.".to_string()
            }
            BlueskyApiError::ExpiredToken => {
                "Bluesky session expired and could not be refreshed.".to_string()
            }
            BlueskyApiError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            BlueskyApiError::NotFound { resource } => {
                format!("'{}' could not be found on Bluesky.", resource)
            }
            BlueskyApiError::InvalidUri { uri } => format!("'{}' is not a valid AT URI.", uri),
            BlueskyApiError::RequestTimeout => {
                "Request to Bluesky timed out. Please try again.".to_string()
            }
            _ => "Bluesky API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            BlueskyApiError::AuthenticationFailed { .. } => "BSKY_AUTH_FAILED".to_string(),
            BlueskyApiError::ExpiredToken => "BSKY_EXPIRED_TOKEN".to_string(),
            BlueskyApiError::RateLimitExceeded { .. } => "BSKY_RATE_LIMIT".to_string(),
            BlueskyApiError::NotFound { .. } => "BSKY_NOT_FOUND".to_string(),
            BlueskyApiError::InvalidRequest { .. } => "BSKY_INVALID_REQUEST".to_string(),
            BlueskyApiError::InvalidUri { .. } => "BSKY_INVALID_URI".to_string(),
            BlueskyApiError::RequestTimeout => "BSKY_TIMEOUT".to_string(),
            BlueskyApiError::InvalidResponse { .. } => "BSKY_INVALID_RESPONSE".to_string(),
            BlueskyApiError::ServerError { .. } => "BSKY_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for NotifierError {
    fn log_error(&self) -> &Self {
        error!("NotifierError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("NotifierError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            NotifierError::RateLimited { .. } | NotifierError::DeliveryFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            NotifierError::RateLimited { retry_after } if *retry_after > 0 => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            NotifierError::NotConfigured => {
                "Operations channel is not configured; notifications are disabled.".to_string()
            }
            NotifierError::RateLimited { retry_after } => format!(
                "Operations channel is rate limiting us. Retry in {} seconds.",
                retry_after
            ),
            NotifierError::Rejected { description, .. } => {
                format!("Operations channel rejected the message: {}", description)
            }
            NotifierError::DeliveryFailed { .. } => {
                "Could not reach the operations channel.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            NotifierError::NotConfigured => "NOTIFIER_NOT_CONFIGURED".to_string(),
            NotifierError::RateLimited { .. } => "NOTIFIER_RATE_LIMIT".to_string(),
            NotifierError::Rejected { .. } => "NOTIFIER_REJECTED".to_string(),
            NotifierError::DeliveryFailed { .. } => "NOTIFIER_DELIVERY_FAILED".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors are typically not retryable
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            ConfigError::Parse(_) => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}
