use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Bluesky API error: {0}")]
    Bluesky(#[from] BlueskyApiError),

    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum BlueskyApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Access token expired")]
    ExpiredToken,

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Record not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid request ({error}): {message}")]
    InvalidRequest { error: String, message: String },

    #[error("Invalid AT URI: {uri}")]
    InvalidUri { uri: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug, Clone)]
pub enum NotifierError {
    #[error("Notifier is not configured")]
    NotConfigured,

    #[error("Rate limited by notification channel. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Message rejected with status {status_code}: {description}")]
    Rejected {
        status_code: u16,
        description: String,
    },

    #[error("Delivery failed: {reason}")]
    DeliveryFailed { reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
