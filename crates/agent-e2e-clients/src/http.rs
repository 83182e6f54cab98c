// crates/agent-e2e-clients/src/http.rs
// ============================================================================
// Module: HTTP Helpers
// Description: Client construction and bounded response handling.
// Purpose: Share status, size, and decode handling between clients.
// Dependencies: reqwest, serde_json, url
// ============================================================================

//! ## Overview
//! Responses are read up to [`MAX_RESPONSE_BYTES`]; larger bodies fail closed.
//! Error bodies are truncated to [`MAX_ERROR_BODY_BYTES`] before they are
//! placed in [`ClientError::Status`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::ClientError;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum response body accepted from any endpoint.
pub(crate) const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;
/// Maximum error body kept in [`ClientError::Status`].
pub(crate) const MAX_ERROR_BODY_BYTES: usize = 1024;
/// Default request timeout.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a blocking client that never follows redirects.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, ClientError> {
    Client::builder()
        .redirect(Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|err| ClientError::Http(err.to_string()))
}

/// Joins `path` onto `base`, keeping any base path prefix.
pub(crate) fn join(base: &Url, path: &str) -> Result<Url, ClientError> {
    let mut prefix = base.clone();
    if !prefix.path().ends_with('/') {
        let with_slash = format!("{}/", prefix.path());
        prefix.set_path(&with_slash);
    }
    prefix
        .join(path.trim_start_matches('/'))
        .map_err(|err| ClientError::InvalidUrl(err.to_string()))
}

/// Parses and checks an `http`/`https` base URL.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let url = Url::parse(raw).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientError::InvalidUrl(format!("unsupported scheme: {other}"))),
    }
}

/// Reads the body, failing on non-success status codes.
pub(crate) fn read_success(response: Response) -> Result<Vec<u8>, ClientError> {
    let status = response.status();
    let body = read_bounded(response)?;
    if !status.is_success() {
        return Err(status_error(status.as_u16(), &body));
    }
    Ok(body)
}

/// Reads the body and decodes it as JSON.
pub(crate) fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let body = read_success(response)?;
    serde_json::from_slice(&body).map_err(|err| ClientError::Decode(err.to_string()))
}

/// Builds a [`ClientError::Status`] with a truncated body.
pub(crate) fn status_error(status: u16, body: &[u8]) -> ClientError {
    let end = body.len().min(MAX_ERROR_BODY_BYTES);
    ClientError::Status {
        status,
        body: String::from_utf8_lossy(&body[..end]).into_owned(),
    }
}

/// Reads at most [`MAX_RESPONSE_BYTES`] from the response.
fn read_bounded(response: Response) -> Result<Vec<u8>, ClientError> {
    let mut body = Vec::new();
    response
        .take(MAX_RESPONSE_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|err| ClientError::Http(err.to_string()))?;
    if body.len() as u64 > MAX_RESPONSE_BYTES {
        return Err(ClientError::Http("response exceeds size limit".to_string()));
    }
    Ok(body)
}
