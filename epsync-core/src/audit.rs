//! Audit trail of remote endpoint mutations.
//!
//! Events go to the `audit` tracing target with the ids of the objects they
//! concern, so a subscriber can route them separately from diagnostics.

use uuid::Uuid;

use crate::ids::{EndpointId, ScopeId};

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Audit,
    Warn,
    Error,
}

/// Audit logger shared by the reconcilers.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    component: String,
    run_id: Uuid,
    enabled: bool,
}

impl AuditLogger {
    /// Create an audit logger for a component. Every event carries a run id
    /// unique to this logger.
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            run_id: Uuid::new_v4(),
            enabled: true,
        }
    }

    /// Create a logger that drops everything (for testing)
    pub fn new_noop() -> Self {
        Self {
            component: String::new(),
            run_id: Uuid::nil(),
            enabled: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn log(&self, level: LogLevel, message: String, object_ids: Vec<String>) {
        if !self.enabled {
            return;
        }
        let component = &self.component;
        let run_id = &self.run_id;
        let objects = &object_ids;
        match level {
            LogLevel::Error => {
                tracing::error!(target: "audit", %component, %run_id, ?objects, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(target: "audit", %component, %run_id, ?objects, "{}", message)
            }
            LogLevel::Audit => {
                tracing::info!(target: "audit", %component, %run_id, ?objects, "{}", message)
            }
        }
    }

    pub fn endpoint_created(&self, id: &EndpointId, name: &str, scope_id: &ScopeId) {
        self.log(
            LogLevel::Audit,
            format!("Service endpoint created: {} ({}) in {}", name, id, scope_id),
            vec![id.to_string(), scope_id.to_string()],
        );
    }

    pub fn endpoint_updated(&self, id: &EndpointId, name: &str) {
        self.log(
            LogLevel::Audit,
            format!("Service endpoint updated: {} ({})", name, id),
            vec![id.to_string()],
        );
    }

    pub fn endpoint_deleted(&self, id: &EndpointId, scope_ids: &[ScopeId]) {
        let mut objects = vec![id.to_string()];
        objects.extend(scope_ids.iter().map(ToString::to_string));
        self.log(
            LogLevel::Audit,
            format!("Service endpoint deleted: {}", id),
            objects,
        );
    }

    /// A create was rolled back after the endpoint failed to become ready.
    pub fn endpoint_compensated(&self, id: &EndpointId, scope_id: &ScopeId, reason: &str) {
        self.log(
            LogLevel::Warn,
            format!("Service endpoint {} rolled back: {}", id, reason),
            vec![id.to_string(), scope_id.to_string()],
        );
    }

    pub fn compensation_failed(&self, id: &EndpointId, scope_id: &ScopeId, error: &str) {
        self.log(
            LogLevel::Error,
            format!(
                "Rolling back service endpoint {} failed, it may be left behind: {}",
                id, error
            ),
            vec![id.to_string(), scope_id.to_string()],
        );
    }

    pub fn references_updated(&self, id: &EndpointId, added: &[ScopeId], removed: &[ScopeId]) {
        let mut objects = vec![id.to_string()];
        objects.extend(added.iter().chain(removed).map(ToString::to_string));
        self.log(
            LogLevel::Audit,
            format!(
                "Service endpoint {} references updated: {} added, {} removed",
                id,
                added.len(),
                removed.len()
            ),
            objects,
        );
    }

    pub fn validation_failed(&self, id: Option<&EndpointId>, scope_id: &ScopeId, message: &str) {
        let mut objects = vec![scope_id.to_string()];
        if let Some(id) = id {
            objects.insert(0, id.to_string());
        }
        self.log(
            LogLevel::Warn,
            format!("Connectivity check failed: {}", message),
            objects,
        );
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new("epsync")
    }
}
