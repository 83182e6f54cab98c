// crates/agent-e2e-core/src/sql.rs
// ============================================================================
// Module: SQL Literal Escaping
// Description: Quote doubling for single-quoted SQL string literals.
// Purpose: Keep interpolated hostnames and tags from breaking out of literals.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Table queries against the backend interpolate values such as hostnames into
//! single-quoted literals. [`escape_sql_string`] doubles every `'` so the value
//! cannot terminate the literal early.
//!
//! This only neutralizes quote breakout. It does not make arbitrary text safe
//! in every SQL context, and it is not idempotent: escaping an already
//! escaped value doubles the quotes again.

// ============================================================================
// SECTION: Escaping
// ============================================================================

/// Doubles every single-quote character in `value`.
///
/// The output length is the input length plus the number of `'` characters.
/// All other characters, including backslashes and double quotes, are kept.
#[must_use]
pub fn escape_sql_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.matches('\'').count());
    for ch in value.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out
}

/// Escapes `value` and wraps it in single quotes.
#[must_use]
pub fn quote_sql_literal(value: &str) -> String {
    format!("'{}'", escape_sql_string(value))
}
