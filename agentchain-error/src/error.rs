//! The main Error type for agentchain

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all agentchain operations.
///
/// This error type provides:
/// - `kind`: What type of error occurred
/// - `message`: Human-readable description
/// - `status`: Whether the error is retryable
/// - `operation`: What operation caused the error
/// - `context`: Key-value pairs for debugging
/// - `source`: The underlying error (if any)
///
/// # Example
///
/// ```rust
/// use agentchain_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::InferenceFailed, "model returned empty response")
///     .with_operation("agent::process")
///     .with_status(ErrorStatus::Temporary)
///     .with_context("agent", "po")
///     .with_context("model", "gpt-4o");
///
/// assert_eq!(err.kind(), ErrorKind::InferenceFailed);
/// assert!(err.status().is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error status
    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Get the operation that caused this error
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Get the context key-value pairs
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Look up a context value by key (first match wins)
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the source error (if any)
    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    /// Set the error status
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark as temporary (retryable)
    pub fn temporary(mut self) -> Self {
        self.status = ErrorStatus::Temporary;
        self
    }

    /// Mark as permanent (not retryable)
    pub fn permanent(mut self) -> Self {
        self.status = ErrorStatus::Permanent;
        self
    }

    /// Set the operation that caused this error.
    ///
    /// If an operation was already set, the previous one is moved to context
    /// as "called" to preserve the call chain.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Replace the human-readable message, keeping kind, status and context
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    // =========================================================================
    // Status mutations
    // =========================================================================

    /// Mark as persistent after failed retries
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.status)?;

        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

// =============================================================================
// std::error::Error implementation
// =============================================================================

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// =============================================================================
// Convenient From implementations (be careful not to leak raw errors!)
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::SerializationFailed, err.to_string())
            .with_operation("serde_json")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    /// Create an Unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create an Unsupported error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    /// Create a ConfigInvalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create an InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Create an UnknownAgent error listing the names that would have worked
    pub fn unknown_agent(name: impl Into<String>, available: &[&str]) -> Self {
        let name = name.into();
        Self::new(
            ErrorKind::UnknownAgent,
            format!(
                "Unknown agent '{}'. Available: [{}]",
                name,
                available.join(", ")
            ),
        )
        .with_context("agent", name)
    }

    /// Create a MissingPrompt error
    pub fn missing_prompt(agent: impl Into<String>) -> Self {
        let agent = agent.into();
        Self::new(
            ErrorKind::MissingPrompt,
            format!("Prompt is required for agent {}", agent),
        )
        .with_context("agent", agent)
    }

    /// Create an InferenceFailed error
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailed, message)
    }

    /// Create an EmptyResponse error
    pub fn empty_response() -> Self {
        Self::new(ErrorKind::EmptyResponse, "no content in response")
    }

    /// Create a NetworkFailed error
    pub fn network_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkFailed, message)
    }

    /// Create a ParseFailed error
    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }
}
