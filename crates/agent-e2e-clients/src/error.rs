// crates/agent-e2e-clients/src/error.rs
// ============================================================================
// Module: Client Errors
// Description: Error type shared by the HTTP clients.
// Dependencies: thiserror
// ============================================================================

//! Client error definitions.

use thiserror::Error;

/// Errors raised by backend and fake intake clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Base URL or derived request URL is invalid.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Transport failure.
    #[error("http error: {0}")]
    Http(String),
    /// Non-success status code.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// Response body did not decode.
    #[error("decode error: {0}")]
    Decode(String),
    /// Response lacked an expected field.
    #[error("missing field in response: {0}")]
    Missing(String),
    /// Request parameters were rejected before sending.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
