//! Error types for endpoint reconciliation.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::ids::{EndpointId, ScopeId};

/// Errors surfaced by an [`EndpointClient`](crate::client::EndpointClient).
///
/// The remote API boundary only distinguishes "the object is not there" from
/// everything else.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The addressed object does not exist (HTTP 404 or equivalent).
    #[error("not found: {0}")]
    NotFound(String),

    /// RPC-level failure, including authentication and permission failures.
    #[error("transport: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Identifies the endpoint a reconciliation is working on.
///
/// Embedded in every error that concerns a remote object so the message alone
/// is enough to locate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub endpoint_id: Option<EndpointId>,
    pub scope_id: ScopeId,
}

impl Target {
    pub fn new(endpoint_id: Option<EndpointId>, scope_id: ScopeId) -> Self {
        Self {
            endpoint_id,
            scope_id,
        }
    }

    pub fn endpoint(endpoint_id: EndpointId, scope_id: ScopeId) -> Self {
        Self::new(Some(endpoint_id), scope_id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint_id {
            Some(id) => write!(f, "service endpoint {} (scope {})", id, self.scope_id),
            None => write!(f, "unsaved service endpoint (scope {})", self.scope_id),
        }
    }
}

/// Errors that can occur while reconciling a service endpoint.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Rejected before any RPC was issued.
    #[error("invalid service endpoint: {0}")]
    Validation(String),

    /// The remote call itself failed. Never retried.
    #[error("remote call failed for {target}: {source}")]
    Transport {
        target: Target,
        #[source]
        source: ClientError,
    },

    /// The endpoint does not exist.
    #[error("{target} not found")]
    NotFound { target: Target },

    /// A status lookup expected an object and got none.
    #[error("looking up state of {target}: {source}")]
    StateFetch {
        target: Target,
        #[source]
        source: ClientError,
    },

    /// The remote operation converged to `Failed`.
    #[error("{target} reached state Failed: {payload}")]
    ConvergenceFailed { target: Target, payload: String },

    /// The deadline elapsed before a terminal state was observed.
    #[error("timed out after {waited:?} waiting for {target} (last observed: {last_observed})")]
    Timeout {
        target: Target,
        waited: Duration,
        last_observed: String,
    },

    /// The caller cancelled the wait.
    #[error("cancelled while waiting for {target}")]
    Cancelled { target: Target },

    /// The probe returned a state that is neither pending nor terminal.
    #[error("unexpected state {state} for {target} (expected one of {expected})")]
    UnexpectedState {
        target: Target,
        state: String,
        expected: String,
    },

    /// The connectivity probe never reported OK before the deadline.
    #[error("connectivity check for {target} failed with status {status_code}: {message}")]
    Connectivity {
        target: Target,
        status_code: String,
        message: String,
    },

    /// A lookup by name matched more than one endpoint.
    #[error("{count} service endpoints named {name:?} found in scope {scope_id}")]
    Ambiguous {
        scope_id: ScopeId,
        name: String,
        count: usize,
    },
}

impl ReconcileError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReconcileError::Validation(message.into())
    }

    pub fn transport(target: Target, source: ClientError) -> Self {
        ReconcileError::Transport { target, source }
    }

    /// `true` when the remote side is still converging and simply ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReconcileError::Timeout { .. })
    }

    /// `true` when the remote side actively rejected the operation.
    pub fn is_convergence_failure(&self) -> bool {
        matches!(self, ReconcileError::ConvergenceFailed { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::NotFound { .. })
    }

    /// The endpoint the error is about, when there is one.
    pub fn target(&self) -> Option<&Target> {
        match self {
            ReconcileError::Transport { target, .. }
            | ReconcileError::NotFound { target }
            | ReconcileError::StateFetch { target, .. }
            | ReconcileError::ConvergenceFailed { target, .. }
            | ReconcileError::Timeout { target, .. }
            | ReconcileError::Cancelled { target }
            | ReconcileError::UnexpectedState { target, .. }
            | ReconcileError::Connectivity { target, .. } => Some(target),
            ReconcileError::Validation(_) | ReconcileError::Ambiguous { .. } => None,
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
