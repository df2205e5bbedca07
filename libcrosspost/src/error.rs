//! Error types for Crosspost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Image transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidInput(_) => 3,
            CrosspostError::Platform(_) => 1,
            CrosspostError::Config(_) => 1,
            CrosspostError::Session(_) => 1,
            CrosspostError::Transfer(_) => 1,
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

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Ad validation failed: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Platform {0} not supported")]
    UnknownPlatform(String),
}

/// Failures of the interactive session primitives.
///
/// Adapters treat these as step outcomes, never as attempt-level errors.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Operation not supported by this session: {0}")]
    Unsupported(String),

    #[error("Session already closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CrosspostError::InvalidInput("Ad title is empty".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_platform_errors() {
        // Posting outcomes travel as PostResults; platform errors are setup failures
        let validation =
            CrosspostError::Platform(PlatformError::Validation("Ad title cannot be empty".to_string()));
        assert_eq!(validation.exit_code(), 1);
        let network =
            CrosspostError::Platform(PlatformError::Network("Failed to build HTTP client".to_string()));
        assert_eq!(network.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_session_error() {
        let error = CrosspostError::Session(SessionError::Launch("no chrome".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = CrosspostError::Config(ConfigError::MissingField("engine".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_unknown_platform() {
        let error = CrosspostError::Platform(PlatformError::UnknownPlatform("myspace".to_string()));
        assert_eq!(
            format!("{}", error),
            "Platform error: Platform myspace not supported"
        );
    }

    #[test]
    fn test_error_message_formatting_session() {
        let error = SessionError::ElementNotFound("#postingForm".to_string());
        assert_eq!(format!("{}", error), "Element not found: #postingForm");
    }

    #[test]
    fn test_error_message_formatting_transfer() {
        let error = TransferError::Download {
            url: "https://img.example/1.jpg".to_string(),
            reason: "HTTP 404".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Download failed for https://img.example/1.jpg: HTTP 404"
        );
    }

    #[test]
    fn test_invalid_value_formatting() {
        let error = ConfigError::InvalidValue {
            field: "platforms.ebay.requests_per_second".to_string(),
            reason: "must be positive".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Invalid value for platforms.ebay.requests_per_second: must be positive"
        );
    }
}
