// crates/agent-e2e-clients/tests/common/mod.rs
// =============================================================================
// Module: Client Test Helpers
// Description: Scripted tiny_http server recording requests.
// Purpose: Exercise clients against a local HTTP double.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(clippy::unwrap_used, reason = "Test helpers unwrap local server setup.")]

use std::thread;
use std::thread::JoinHandle;

use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

/// Request observed by the scripted server.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// HTTP method.
    pub method: String,
    /// Request path and query.
    pub url: String,
    /// Request headers as lowercase name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: String,
}

impl Recorded {
    /// Returns the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers.iter().find(|(key, _)| *key == name).map(|(_, value)| value.as_str())
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Serves one scripted `(status, body)` response per request, in order.
///
/// Returns the base URL and a handle yielding the recorded requests.
pub fn scripted_server(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<Recorded>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let handle = thread::spawn(move || {
        let mut recorded = Vec::new();
        for (status, body) in responses {
            let Ok(mut request) = server.recv() else {
                break;
            };
            let mut request_body = String::new();
            let _ = request.as_reader().read_to_string(&mut request_body);
            recorded.push(Recorded {
                method: request.method().as_str().to_string(),
                url: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|h| (h.field.as_str().as_str().to_ascii_lowercase(), h.value.to_string()))
                    .collect(),
                body: request_body,
            });
            let content_type =
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let response = Response::from_string(body).with_status_code(status).with_header(content_type);
            let _ = request.respond(response);
        }
        recorded
    });
    (format!("http://{addr}"), handle)
}
