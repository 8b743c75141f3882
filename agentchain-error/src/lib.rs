//! # agentchain-error
//!
//! Unified error handling for agentchain, following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., UnknownAgent, InferenceFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use agentchain_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::InferenceFailed, "model returned 500")
//!         .with_operation("agent::process")
//!         .with_context("agent", "arch")
//!         .with_context("model", "gpt-4o"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, agentchain_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using agentchain Error
pub type Result<T> = std::result::Result<T, Error>;
