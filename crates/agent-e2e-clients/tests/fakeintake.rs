// crates/agent-e2e-clients/tests/fakeintake.rs
// ============================================================================
// Module: Fake Intake Client Tests
// Description: Payload listing, decoding, and client-side filtering.
// Purpose: Ensure suites see exactly the payloads the agent sent.
// ============================================================================

//! Fake intake client tests.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]
#![allow(clippy::expect_used, reason = "Tests use expect for explicit failure messages.")]

use agent_e2e_clients::ClientError;
use agent_e2e_clients::FakeIntakeClient;
use agent_e2e_clients::MetricFilter;
use agent_e2e_clients::fakeintake::routes;
use common::scripted_server;

mod common;

const METRICS_RESPONSE: &str = r#"{"payloads": [
  {"timestamp": "2024-05-01T00:00:00Z", "encoding": "deflate", "data": {"series": [
    {"metric": "gpu.utilization", "points": [{"timestamp": 1, "value": 42.0}],
     "tags": ["gpu_vendor:nvidia", "gpu_uuid:1"], "resources": [{"type": "host", "name": "h1"}]},
    {"metric": "gpu.utilization", "points": [{"timestamp": 1, "value": 0.0}],
     "tags": ["gpu_vendor:nvidia", "gpu_uuid:2"]}
  ]}},
  {"timestamp": "2024-05-01T00:00:10Z", "encoding": "deflate", "data": {"series": [
    {"metric": "system.cpu.user", "points": [{"timestamp": 2, "value": 3.5}], "tags": []}
  ]}}
]}"#;

#[test]
fn payloads_request_uses_endpoint_and_format() {
    let (base, handle) = scripted_server(vec![(200, r#"{"payloads": []}"#.to_string())]);
    let client = FakeIntakeClient::new(&base).unwrap();
    assert!(client.payloads(routes::TRACES).unwrap().is_empty());
    let request = handle.join().unwrap().remove(0);
    assert_eq!(request.method, "GET");
    assert_eq!(request.url, "/fakeintake/payloads?endpoint=%2Fapi%2Fv0.2%2Ftraces&format=json");
}

#[test]
fn check_runs_are_read_from_their_route() {
    let body = r#"{"payloads": [{"data": [{"check": "datadog.agent.up", "status": 0}]}]}"#;
    let (base, handle) = scripted_server(vec![(200, body.to_string())]);
    let runs = FakeIntakeClient::new(&base).unwrap().check_runs().unwrap();
    let request = handle.join().unwrap().remove(0);
    assert_eq!(request.url, "/fakeintake/payloads?endpoint=%2Fapi%2Fv1%2Fcheck_run&format=json");
    assert_eq!(runs[0][0]["check"], "datadog.agent.up");
}

#[test]
fn legacy_payload_key_is_accepted() {
    let (base, handle) =
        scripted_server(vec![(200, r#"{"json_payloads": [{"data": {"k": 1}}]}"#.to_string())]);
    let data = FakeIntakeClient::new(&base).unwrap().flares().unwrap();
    handle.join().unwrap();
    assert_eq!(data[0]["k"], 1);
}

#[test]
fn metrics_are_filtered_client_side() {
    let (base, handle) = scripted_server(vec![
        (200, METRICS_RESPONSE.to_string()),
        (200, METRICS_RESPONSE.to_string()),
        (200, METRICS_RESPONSE.to_string()),
    ]);
    let client = FakeIntakeClient::new(&base).unwrap();
    let all = client.metrics(&MetricFilter::named("gpu.utilization")).unwrap();
    assert_eq!(all.len(), 2);
    let tagged = client
        .metrics(&MetricFilter::named("gpu.utilization").with_tag("gpu_uuid:1").with_min_value(1.0))
        .unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].host(), Some("h1"));
    let names = client.metric_names().unwrap();
    assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["gpu.utilization", "system.cpu.user"]);
    handle.join().unwrap();
}

#[test]
fn logs_filter_by_service() {
    let response = r#"{"payloads": [{"data": [
        {"message": "a", "service": "web", "ddtags": "env:e2e, team:x"},
        {"message": "b", "service": "db"}
    ]}]}"#;
    let (base, handle) = scripted_server(vec![(200, response.to_string())]);
    let logs = FakeIntakeClient::new(&base).unwrap().logs(Some("web")).unwrap();
    handle.join().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].tags(), vec!["env:e2e", "team:x"]);
}

#[test]
fn health_and_flush_hit_admin_routes() {
    let (base, handle) = scripted_server(vec![(200, String::new()), (200, String::new())]);
    let client = FakeIntakeClient::new(&base).unwrap();
    client.health().unwrap();
    client.flush().unwrap();
    let requests = handle.join().unwrap();
    assert_eq!((requests[0].method.as_str(), requests[0].url.as_str()), ("GET", "/fakeintake/health"));
    assert_eq!(
        (requests[1].method.as_str(), requests[1].url.as_str()),
        ("POST", "/fakeintake/flushPayloads")
    );
}

#[test]
fn unhealthy_intake_is_an_error() {
    let (base, handle) = scripted_server(vec![(503, "starting".to_string())]);
    let err = FakeIntakeClient::new(&base).unwrap().health().expect_err("unhealthy");
    handle.join().unwrap();
    assert_eq!(err, ClientError::Status { status: 503, body: "starting".to_string() });
}

#[test]
fn base_url_scheme_is_checked() {
    assert!(matches!(FakeIntakeClient::new("ftp://intake"), Err(ClientError::InvalidUrl(_))));
}

#[test]
fn base_path_prefix_is_kept() {
    let (base, handle) = scripted_server(vec![(200, String::new())]);
    FakeIntakeClient::new(&format!("{base}/proxy")).unwrap().health().unwrap();
    assert_eq!(handle.join().unwrap()[0].url, "/proxy/fakeintake/health");
}
