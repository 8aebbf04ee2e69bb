//! Error types for Omnipost

use thiserror::Error;

use crate::types::PlatformId;

pub type Result<T> = std::result::Result<T, OmnipostError>;

#[derive(Error, Debug)]
pub enum OmnipostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl OmnipostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            OmnipostError::InvalidInput(_) => 3,
            OmnipostError::Platform(PlatformError::AuthExpired(_))
            | OmnipostError::Platform(PlatformError::NotConnected(_)) => 2,
            OmnipostError::Platform(_) => 1,
            OmnipostError::Config(_) => 1,
            OmnipostError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Per-platform failure taxonomy.
///
/// Each variant maps to one outcome class from the dispatcher's point of
/// view: `AuthExpired` is recoverable via one token refresh-and-retry, the
/// rest are terminal for that platform within the current batch.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    /// No connected account (or no configured publisher) for this platform.
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Access token rejected or past its expiry with no usable refresh token.
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// The provider rejected the request (4xx other than auth/rate-limit).
    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    /// Asynchronous media processing (e.g. video transcoding) reported failure.
    #[error("Media processing failed: {0}")]
    MediaProcessingFailed(String),

    /// Asynchronous media processing did not finish within the poll budget.
    #[error("Media processing timed out: {0}")]
    MediaProcessingTimeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// The platform cannot carry this content (e.g. images on a video-only
    /// platform).
    #[error("Unsupported content: {0}")]
    Unsupported(String),
}

impl PlatformError {
    /// Classify an HTTP error response from a provider into the taxonomy.
    ///
    /// `detail` is the raw response body, preserved verbatim so provider
    /// error codes survive into logs and activity records.
    pub fn from_status(platform: PlatformId, status: u16, detail: &str) -> Self {
        match status {
            401 | 403 => PlatformError::AuthExpired(format!("{platform}: HTTP {status}: {detail}")),
            429 => PlatformError::RateLimited(format!("{platform}: HTTP {status}: {detail}")),
            400..=499 => {
                PlatformError::ProviderRejected(format!("{platform}: HTTP {status}: {detail}"))
            }
            _ => PlatformError::Network(format!("{platform}: HTTP {status}: {detail}")),
        }
    }
}
