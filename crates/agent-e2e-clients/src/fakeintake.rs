// crates/agent-e2e-clients/src/fakeintake.rs
// ============================================================================
// Module: Fake Intake Client
// Description: Reads payloads an agent sent to a fake intake.
// Purpose: Let suites assert on metrics, logs, traces, and flares without
//          a real backend.
// Dependencies: reqwest, serde, serde_json, url
// ============================================================================

//! ## Overview
//! The fake intake stores every payload it receives, keyed by route. The
//! client lists payloads for one route with `format=json` and decodes them.
//! Filtering by metric name, tag, or service happens client-side.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::ClientError;
use crate::http::DEFAULT_TIMEOUT;
use crate::http::build_client;
use crate::http::join;
use crate::http::parse_base_url;
use crate::http::read_json;
use crate::http::read_success;

// ============================================================================
// SECTION: Routes
// ============================================================================

/// Agent intake routes recorded by the fake intake.
pub mod routes {
    /// Metric series.
    pub const METRICS: &str = "/api/v2/series";
    /// Logs.
    pub const LOGS: &str = "/api/v2/logs";
    /// Traces.
    pub const TRACES: &str = "/api/v0.2/traces";
    /// Flare uploads.
    pub const FLARE: &str = "/support/flare";
    /// Service discovery events.
    pub const SERVICE_DISCOVERY: &str = "/api/v2/service_discovery";
    /// Check run service checks.
    pub const CHECK_RUNS: &str = "/api/v1/check_run";
}

/// Health endpoint.
const HEALTH_PATH: &str = "fakeintake/health";
/// Payload listing endpoint.
const PAYLOADS_PATH: &str = "fakeintake/payloads";
/// Payload flush endpoint.
const FLUSH_PATH: &str = "fakeintake/flushPayloads";

// ============================================================================
// SECTION: Payload Types
// ============================================================================

/// One stored payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Payload {
    /// Receive time as reported by the fake intake.
    #[serde(default)]
    pub timestamp: String,
    /// Decoded payload body.
    #[serde(default)]
    pub data: Value,
    /// Original content encoding.
    #[serde(default)]
    pub encoding: String,
}

/// Payload listing response.
#[derive(Deserialize)]
struct PayloadList {
    /// Decoded payloads.
    #[serde(default, alias = "json_payloads")]
    payloads: Vec<Payload>,
}

/// One metric series.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetricSeries {
    /// Metric name.
    pub metric: String,
    /// Points in the series.
    #[serde(default)]
    pub points: Vec<MetricPoint>,
    /// Series tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Attached resources, e.g. the reporting host.
    #[serde(default)]
    pub resources: Vec<MetricResource>,
}

/// One metric point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct MetricPoint {
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Point value.
    #[serde(default)]
    pub value: f64,
}

/// Resource attached to a series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetricResource {
    /// Resource type, e.g. `host`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Resource name.
    #[serde(default)]
    pub name: String,
}

impl MetricSeries {
    /// Returns the host resource, if any.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.resources.iter().find(|res| res.kind == "host").map(|res| res.name.as_str())
    }
}

/// Series envelope inside a metrics payload.
#[derive(Deserialize)]
struct SeriesPayload {
    /// Series carried by the payload.
    #[serde(default)]
    series: Vec<MetricSeries>,
}

/// One log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogEntry {
    /// Log message.
    #[serde(default)]
    pub message: String,
    /// Service name.
    #[serde(default)]
    pub service: String,
    /// Comma-separated tags.
    #[serde(default)]
    pub ddtags: String,
    /// Reporting host.
    #[serde(default)]
    pub hostname: String,
    /// Log status.
    #[serde(default)]
    pub status: String,
}

impl LogEntry {
    /// Returns the tags split on `,`.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        self.ddtags.split(',').map(str::trim).filter(|tag| !tag.is_empty()).collect()
    }
}

// ============================================================================
// SECTION: Metric Filter
// ============================================================================

/// Client-side metric filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricFilter {
    /// Metric name to match.
    pub name: String,
    /// Tags every matching series must carry.
    pub tags: Vec<String>,
    /// Minimum value at least one point must reach.
    pub min_value: Option<f64>,
}

impl MetricFilter {
    /// Matches series named `name`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Requires `tag` on matching series.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Requires at least one point at or above `value`.
    #[must_use]
    pub const fn with_min_value(mut self, value: f64) -> Self {
        self.min_value = Some(value);
        self
    }

    /// Returns true when `series` passes the filter.
    #[must_use]
    pub fn matches(&self, series: &MetricSeries) -> bool {
        series.metric == self.name
            && self.tags.iter().all(|tag| series.tags.contains(tag))
            && self.min_value.is_none_or(|min| series.points.iter().any(|p| p.value >= min))
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Blocking fake intake client.
pub struct FakeIntakeClient {
    /// Fake intake base URL.
    base_url: Url,
    /// Underlying HTTP client.
    client: Client,
}

impl FakeIntakeClient {
    /// Creates a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            client: build_client(timeout)?,
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Checks that the fake intake is up.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] unless the health endpoint answers 2xx.
    pub fn health(&self) -> Result<(), ClientError> {
        let url = join(&self.base_url, HEALTH_PATH)?;
        let response =
            self.client.get(url).send().map_err(|err| ClientError::Http(err.to_string()))?;
        read_success(response).map(|_| ())
    }

    /// Drops every stored payload.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the flush fails.
    pub fn flush(&self) -> Result<(), ClientError> {
        let url = join(&self.base_url, FLUSH_PATH)?;
        let response =
            self.client.post(url).send().map_err(|err| ClientError::Http(err.to_string()))?;
        read_success(response).map(|_| ())
    }

    /// Lists decoded payloads stored for `route`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request or decoding fails.
    pub fn payloads(&self, route: &str) -> Result<Vec<Payload>, ClientError> {
        let mut url = join(&self.base_url, PAYLOADS_PATH)?;
        url.query_pairs_mut().append_pair("endpoint", route).append_pair("format", "json");
        let response =
            self.client.get(url).send().map_err(|err| ClientError::Http(err.to_string()))?;
        let list: PayloadList = read_json(response)?;
        Ok(list.payloads)
    }

    /// Returns every metric series received.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request or decoding fails.
    pub fn all_metrics(&self) -> Result<Vec<MetricSeries>, ClientError> {
        let mut series = Vec::new();
        for payload in self.payloads(routes::METRICS)? {
            let decoded: SeriesPayload = serde_json::from_value(payload.data)
                .map_err(|err| ClientError::Decode(err.to_string()))?;
            series.extend(decoded.series);
        }
        Ok(series)
    }

    /// Returns the series matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request or decoding fails.
    pub fn metrics(&self, filter: &MetricFilter) -> Result<Vec<MetricSeries>, ClientError> {
        Ok(self.all_metrics()?.into_iter().filter(|series| filter.matches(series)).collect())
    }

    /// Returns the distinct metric names received.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request or decoding fails.
    pub fn metric_names(&self) -> Result<BTreeSet<String>, ClientError> {
        Ok(self.all_metrics()?.into_iter().map(|series| series.metric).collect())
    }

    /// Returns logs, optionally restricted to `service`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request or decoding fails.
    pub fn logs(&self, service: Option<&str>) -> Result<Vec<LogEntry>, ClientError> {
        let mut entries = Vec::new();
        for payload in self.payloads(routes::LOGS)? {
            let decoded: Vec<LogEntry> = serde_json::from_value(payload.data)
                .map_err(|err| ClientError::Decode(err.to_string()))?;
            entries.extend(
                decoded.into_iter().filter(|entry| service.is_none_or(|svc| entry.service == svc)),
            );
        }
        Ok(entries)
    }

    /// Returns raw trace payloads.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request fails.
    pub fn traces(&self) -> Result<Vec<Value>, ClientError> {
        self.payload_data(routes::TRACES)
    }

    /// Returns raw flare payloads.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request fails.
    pub fn flares(&self) -> Result<Vec<Value>, ClientError> {
        self.payload_data(routes::FLARE)
    }

    /// Returns raw service discovery payloads.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request fails.
    pub fn service_discovery(&self) -> Result<Vec<Value>, ClientError> {
        self.payload_data(routes::SERVICE_DISCOVERY)
    }

    /// Returns raw check run payloads, one array of service checks each.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request fails.
    pub fn check_runs(&self) -> Result<Vec<Value>, ClientError> {
        self.payload_data(routes::CHECK_RUNS)
    }

    /// Returns the `data` of every payload on `route`.
    fn payload_data(&self, route: &str) -> Result<Vec<Value>, ClientError> {
        Ok(self.payloads(route)?.into_iter().map(|payload| payload.data).collect())
    }
}
