// crates/agent-e2e-clients/src/backend.rs
// ============================================================================
// Module: Backend Client
// Description: REST client for CWS rules, signals, logs, and table queries.
// Purpose: Create and remove backend objects suites depend on, and search
//          the data the agent shipped.
// Dependencies: agent-e2e-core, reqwest, serde, serde_json, url
// ============================================================================

//! ## Overview
//! Every request carries the `DD-API-KEY` and `DD-APPLICATION-KEY` headers.
//! Deletes treat `404 Not Found` as success so cleanup can run twice.
//! [`TableQuery`] builds SQL-like table queries; every literal value passes
//! through [`quote_sql_literal`] and identifiers are restricted to
//! `[A-Za-z0-9_.]`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use agent_e2e_core::AgentRule;
use agent_e2e_core::SignalRuleSpec;
use agent_e2e_core::quote_sql_literal;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::blocking::RequestBuilder;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use url::Url;

use crate::error::ClientError;
use crate::http::DEFAULT_TIMEOUT;
use crate::http::build_client;
use crate::http::join;
use crate::http::parse_base_url;
use crate::http::read_json;
use crate::http::read_success;

// ============================================================================
// SECTION: Endpoints
// ============================================================================

/// CWS agent rule collection.
const AGENT_RULES_PATH: &str = "api/v2/remote_config/products/cws/agent_rules";
/// Detection rule collection.
const SIGNAL_RULES_PATH: &str = "api/v2/security_monitoring/rules";
/// Log search endpoint.
const LOG_SEARCH_PATH: &str = "api/v2/logs/events/search";
/// Signal search endpoint.
const SIGNAL_SEARCH_PATH: &str = "api/v2/security_monitoring/signals/search";
/// Table query endpoint.
const TABLE_QUERY_PATH: &str = "api/v2/ddsql/table";
/// Header carrying the API key.
const API_KEY_HEADER: &str = "DD-API-KEY";
/// Header carrying the application key.
const APP_KEY_HEADER: &str = "DD-APPLICATION-KEY";
/// Page size for log and signal searches.
const SEARCH_PAGE_LIMIT: u32 = 50;

// ============================================================================
// SECTION: Rule API
// ============================================================================

/// Rule lifecycle and signal lookup used by CWS suites.
pub trait RuleApi {
    /// Creates an agent rule and returns its backend id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the backend rejects the rule.
    fn create_agent_rule(&self, rule: &AgentRule) -> Result<String, ClientError>;

    /// Deletes an agent rule by backend id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the delete fails.
    fn delete_agent_rule(&self, id: &str) -> Result<(), ClientError>;

    /// Creates a signal rule and returns its backend id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the backend rejects the rule.
    fn create_signal_rule(&self, spec: &SignalRuleSpec) -> Result<String, ClientError>;

    /// Deletes a signal rule by backend id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the delete fails.
    fn delete_signal_rule(&self, id: &str) -> Result<(), ClientError>;

    /// Searches security signals over the last `window`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the search fails.
    fn search_signals(
        &self,
        query: &str,
        window: Duration,
    ) -> Result<Vec<SecuritySignal>, ClientError>;
}

// ============================================================================
// SECTION: Response Types
// ============================================================================

/// Log event returned by the log search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogEvent {
    /// Event id.
    pub id: String,
    /// Message text.
    pub message: String,
    /// Service name.
    pub service: String,
    /// Reporting host.
    pub host: String,
    /// Event tags.
    pub tags: Vec<String>,
    /// Structured attributes.
    pub attributes: Value,
}

/// Security signal returned by the signal search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecuritySignal {
    /// Signal id.
    pub id: String,
    /// Signal message.
    pub message: String,
    /// Signal tags.
    pub tags: Vec<String>,
    /// Custom attributes, including the triggering agent rule.
    pub custom: Value,
}

impl SecuritySignal {
    /// Returns the agent rule id recorded on the signal, if any.
    #[must_use]
    pub fn agent_rule_id(&self) -> Option<&str> {
        self.custom.pointer("/agent/rule_id").and_then(Value::as_str)
    }
}

/// JSON:API list envelope.
#[derive(Deserialize)]
struct ListEnvelope {
    /// Result items.
    #[serde(default)]
    data: Vec<ListItem>,
}

/// JSON:API list item.
#[derive(Deserialize)]
struct ListItem {
    /// Item id.
    #[serde(default)]
    id: String,
    /// Item attributes.
    #[serde(default)]
    attributes: Value,
}

// ============================================================================
// SECTION: Backend Client
// ============================================================================

/// Blocking client for the backend REST API.
pub struct BackendClient {
    /// API base URL, e.g. `https://api.datadoghq.com/`.
    base_url: Url,
    /// API key.
    api_key: String,
    /// Application key.
    app_key: String,
    /// Underlying HTTP client.
    client: Client,
}

impl BackendClient {
    /// Creates a client for `base_url` with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        app_key: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, api_key, app_key, DEFAULT_TIMEOUT)
    }

    /// Creates a client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn with_timeout(
        base_url: &str,
        api_key: impl Into<String>,
        app_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let api_key = api_key.into();
        let app_key = app_key.into();
        if api_key.trim().is_empty() || app_key.trim().is_empty() {
            return Err(ClientError::InvalidRequest("api and app keys are required".to_string()));
        }
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            api_key,
            app_key,
            client: build_client(timeout)?,
        })
    }

    /// Returns the API base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Searches logs matching `query` over the last `window`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the search fails.
    pub fn search_logs(&self, query: &str, window: Duration) -> Result<Vec<LogEvent>, ClientError> {
        let envelope: ListEnvelope = self.post(LOG_SEARCH_PATH, &search_body(query, window))?;
        Ok(envelope
            .data
            .into_iter()
            .map(|item| LogEvent {
                message: string_at(&item.attributes, "/message"),
                service: string_at(&item.attributes, "/service"),
                host: string_at(&item.attributes, "/host"),
                tags: strings_at(&item.attributes, "/tags"),
                attributes: item.attributes.get("attributes").cloned().unwrap_or(Value::Null),
                id: item.id,
            })
            .collect())
    }

    /// Runs a table query and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the query fails or the response lacks rows.
    pub fn table_query(
        &self,
        query: &TableQuery,
    ) -> Result<Vec<BTreeMap<String, Value>>, ClientError> {
        let body = json!({
            "data": {
                "type": "ddsql_table_request",
                "attributes": { "query": query.to_sql() }
            }
        });
        let response: Value = self.post(TABLE_QUERY_PATH, &body)?;
        let rows = response
            .pointer("/data/attributes/rows")
            .cloned()
            .ok_or_else(|| ClientError::Missing("data.attributes.rows".to_string()))?;
        serde_json::from_value(rows).map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// Adds authentication headers to a request.
    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(API_KEY_HEADER, &self.api_key).header(APP_KEY_HEADER, &self.app_key)
    }

    /// Posts a JSON body and decodes the JSON response.
    fn post<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = join(&self.base_url, path)?;
        let response = self
            .authed(self.client.post(url))
            .json(body)
            .send()
            .map_err(|err| ClientError::Http(err.to_string()))?;
        read_json(response)
    }

    /// Deletes `path/id`, treating 404 as already deleted.
    fn delete(&self, path: &str, id: &str) -> Result<(), ClientError> {
        if id.is_empty() || id.contains('/') {
            return Err(ClientError::InvalidRequest(format!("invalid id: {id}")));
        }
        let url = join(&self.base_url, &format!("{path}/{id}"))?;
        let response = self
            .authed(self.client.delete(url))
            .send()
            .map_err(|err| ClientError::Http(err.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        read_success(response).map(|_| ())
    }
}

impl RuleApi for BackendClient {
    fn create_agent_rule(&self, rule: &AgentRule) -> Result<String, ClientError> {
        let body = json!({
            "data": {
                "type": "agent_rule",
                "attributes": {
                    "name": rule.id,
                    "expression": rule.expression,
                    "description": rule.description,
                    "enabled": true,
                }
            }
        });
        let response: Value = self.post(AGENT_RULES_PATH, &body)?;
        response
            .pointer("/data/id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| ClientError::Missing("data.id".to_string()))
    }

    fn delete_agent_rule(&self, id: &str) -> Result<(), ClientError> {
        self.delete(AGENT_RULES_PATH, id)
    }

    fn create_signal_rule(&self, spec: &SignalRuleSpec) -> Result<String, ClientError> {
        let body = json!({
            "name": spec.name,
            "message": spec.message,
            "isEnabled": true,
            "type": "workload_security",
            "tags": spec.tags,
            "queries": [{
                "name": "a",
                "query": spec.query(),
                "aggregation": "count",
                "groupByFields": [],
            }],
            "cases": [{ "name": "", "status": "info", "condition": "a > 0" }],
            "options": { "evaluationWindow": 0, "keepAlive": 0, "maxSignalDuration": 0 },
        });
        let response: Value = self.post(SIGNAL_RULES_PATH, &body)?;
        response
            .get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| ClientError::Missing("id".to_string()))
    }

    fn delete_signal_rule(&self, id: &str) -> Result<(), ClientError> {
        self.delete(SIGNAL_RULES_PATH, id)
    }

    fn search_signals(
        &self,
        query: &str,
        window: Duration,
    ) -> Result<Vec<SecuritySignal>, ClientError> {
        let envelope: ListEnvelope = self.post(SIGNAL_SEARCH_PATH, &search_body(query, window))?;
        Ok(envelope
            .data
            .into_iter()
            .map(|item| SecuritySignal {
                message: string_at(&item.attributes, "/message"),
                tags: strings_at(&item.attributes, "/tags"),
                custom: item.attributes.get("custom").cloned().unwrap_or(Value::Null),
                id: item.id,
            })
            .collect())
    }
}

// ============================================================================
// SECTION: Table Queries
// ============================================================================

/// SQL-like query over a backend table.
///
/// ```
/// use agent_e2e_clients::TableQuery;
///
/// let sql = TableQuery::new("host")
///     .unwrap()
///     .select("hostname")
///     .unwrap()
///     .where_eq("hostname", "qa's-box")
///     .unwrap()
///     .limit(1)
///     .to_sql();
/// assert_eq!(sql, "SELECT hostname FROM host WHERE hostname = 'qa''s-box' LIMIT 1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    /// Table name.
    table: String,
    /// Selected columns; empty selects `*`.
    columns: Vec<String>,
    /// Equality filters joined with `AND`.
    filters: Vec<(String, String)>,
    /// Row limit.
    limit: Option<u32>,
}

impl TableQuery {
    /// Starts a query over `table`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] when the name is not a plain
    /// identifier.
    pub fn new(table: &str) -> Result<Self, ClientError> {
        validate_identifier(table)?;
        Ok(Self {
            table: table.to_string(),
            columns: Vec::new(),
            filters: Vec::new(),
            limit: None,
        })
    }

    /// Adds a selected column.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] for a non-identifier column.
    pub fn select(mut self, column: &str) -> Result<Self, ClientError> {
        validate_identifier(column)?;
        self.columns.push(column.to_string());
        Ok(self)
    }

    /// Adds an equality filter; `value` is quoted as a string literal.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] for a non-identifier column.
    pub fn where_eq(mut self, column: &str, value: &str) -> Result<Self, ClientError> {
        validate_identifier(column)?;
        self.filters.push((column.to_string(), value.to_string()));
        Ok(self)
    }

    /// Limits the number of rows.
    #[must_use]
    pub const fn limit(mut self, rows: u32) -> Self {
        self.limit = Some(rows);
        self
    }

    /// Renders the query text.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let columns = if self.columns.is_empty() { "*".to_string() } else { self.columns.join(", ") };
        let mut sql = format!("SELECT {columns} FROM {}", self.table);
        for (index, (column, value)) in self.filters.iter().enumerate() {
            let keyword = if index == 0 { "WHERE" } else { "AND" };
            let _ = write!(sql, " {keyword} {column} = {}", quote_sql_literal(value));
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }
        sql
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a search request body over the last `window`.
fn search_body(query: &str, window: Duration) -> Value {
    json!({
        "filter": {
            "query": query,
            "from": format!("now-{}s", window.as_secs().max(1)),
            "to": "now",
        },
        "page": { "limit": SEARCH_PAGE_LIMIT },
        "sort": "-timestamp",
    })
}

/// Returns the string at `pointer`, or empty.
fn string_at(value: &Value, pointer: &str) -> String {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Returns the string array at `pointer`, skipping non-strings.
fn strings_at(value: &Value, pointer: &str) -> Vec<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(ToString::to_string).collect())
        .unwrap_or_default()
}

/// Accepts `[A-Za-z0-9_.]+` identifiers starting with a letter or `_`.
fn validate_identifier(name: &str) -> Result<(), ClientError> {
    let valid = name.starts_with(|ch: char| ch.is_ascii_alphabetic() || ch == '_')
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.');
    if valid {
        Ok(())
    } else {
        Err(ClientError::InvalidRequest(format!("invalid identifier: {name}")))
    }
}
