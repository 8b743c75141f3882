//! Error kinds for agentchain operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to report or recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Orchestration errors
    // =========================================================================
    /// No agent is registered under the requested name
    UnknownAgent,

    /// An agent was selected but no prompt was given
    MissingPrompt,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// The model answered without any text
    EmptyResponse,

    /// Provider not available
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// The provider rejected our credentials
    AuthenticationFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// Network error
    NetworkFailed,

    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Orchestration
            ErrorKind::UnknownAgent => "UnknownAgent",
            ErrorKind::MissingPrompt => "MissingPrompt",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::EmptyResponse => "EmptyResponse",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",

            // IO
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
