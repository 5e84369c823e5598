//! Identifiers for endpoints and scopes.
//!
//! The remote service hands out GUIDs, but nothing here depends on that: ids
//! are opaque strings that must be non-blank and free of whitespace and `/`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

fn check(kind: &str, raw: &str) -> Result<()> {
    if raw.trim().is_empty() {
        return Err(ReconcileError::validation(format!("{kind} is required")));
    }
    if raw.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(ReconcileError::validation(format!(
            "malformed {kind} {raw:?}"
        )));
    }
    Ok(())
}

/// Identifier assigned by the remote service on create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    /// Wrap a raw id without validation.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        check("service endpoint id", raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a scope (project) that may use an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    /// Wrap a raw id without validation.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        check("scope id", raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Comparison key. The remote service treats scope ids case-insensitively.
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn same_as(&self, other: &ScopeId) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a `<scope-id>/<endpoint-id>` import string.
pub fn parse_import_id(raw: &str) -> Result<(ScopeId, EndpointId)> {
    let (scope, endpoint) = raw.split_once('/').ok_or_else(|| {
        ReconcileError::validation(format!(
            "import id {raw:?} must have the form <scope-id>/<endpoint-id>"
        ))
    })?;
    Ok((ScopeId::parse(scope)?, EndpointId::parse(endpoint)?))
}
