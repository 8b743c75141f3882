//! LLM client error types
//!
//! Re-exports agentchain-error and provides provider-specific conveniences.

pub use agentchain_error::{Error, ErrorKind, ErrorStatus, Result};

/// Map a non-success HTTP status from a provider into an Error
pub fn http_status(
    operation: &'static str,
    status: u16,
    body: impl Into<String>,
    retry_after: Option<u64>,
) -> Error {
    let body = body.into();
    let err = match status {
        401 | 403 => Error::new(ErrorKind::AuthenticationFailed, "authentication failed"),
        429 => {
            let err = Error::new(ErrorKind::RateLimited, "rate limited");
            match retry_after {
                Some(secs) => err.with_context("retry_after", secs.to_string()),
                None => err,
            }
        }
        500..=599 => Error::new(ErrorKind::ProviderUnavailable, body.clone()),
        _ => Error::inference_failed(body.clone()).permanent(),
    };

    err.with_operation(operation)
        .with_context("status", status.to_string())
        .with_context("body", truncate(&body, 500))
}

/// Wrap a transport error from reqwest
pub fn network(operation: &'static str, err: reqwest::Error) -> Error {
    let kind = if err.is_decode() {
        ErrorKind::ParseFailed
    } else {
        ErrorKind::NetworkFailed
    };
    let err_msg = err.to_string();
    let mut error = Error::new(kind, err_msg).with_operation(operation);
    if err.is_timeout() {
        error = error.with_context("timeout", "true");
    }
    error.set_source(err)
}

/// Create a ParseFailed error for an undecodable provider body
pub fn parse(operation: &'static str, message: impl Into<String>) -> Error {
    Error::parse_failed(message).with_operation(operation)
}

/// Create a ConfigInvalid error for a provider that cannot be built
pub fn config(message: impl Into<String>) -> Error {
    Error::config_invalid(message).with_operation("provider::new")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}…", head)
    }
}
