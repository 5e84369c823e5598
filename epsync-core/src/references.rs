//! Scope reference reconciliation: which scopes may use an endpoint.
//!
//! The remote service only accepts the full reference list as part of an
//! endpoint update, so every change is planned locally and sent in one call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::audit::AuditLogger;
use crate::client::{ClientResult, EndpointClient};
use crate::error::{ClientError, ReconcileError, Result, Target};
use crate::ids::{EndpointId, ScopeId};
use crate::model::{ScopeReference, ServiceEndpoint};

/// Desired per-scope fields of a reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceFields {
    pub display_name: String,
    pub description: String,
}

impl ReferenceFields {
    pub fn new(display_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            description: description.into(),
        }
    }
}

/// Outcome of [`plan_references`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePlan {
    /// The complete new reference list.
    pub references: Vec<ScopeReference>,
    pub added: Vec<ScopeId>,
    pub removed: Vec<ScopeId>,
}

/// Compute the new reference list from the observed one and the desired set.
///
/// Observed entries keep their order. Entries that are desired get their
/// fields overwritten, the rest are dropped, except the first (owning) entry
/// which is always kept. Desired scopes not yet referenced are appended in
/// scope id order. Scope ids compare case-insensitively.
pub fn plan_references(
    observed: &[ScopeReference],
    desired: &BTreeMap<ScopeId, ReferenceFields>,
) -> ReferencePlan {
    let by_key: BTreeMap<String, (&ScopeId, &ReferenceFields)> = desired
        .iter()
        .map(|(scope_id, fields)| (scope_id.key(), (scope_id, fields)))
        .collect();

    let mut consumed = BTreeSet::new();
    let mut references = Vec::with_capacity(observed.len().max(by_key.len()));
    let mut removed = Vec::new();

    for (i, existing) in observed.iter().enumerate() {
        let key = existing.scope_id.key();
        match by_key.get(&key) {
            Some((_, fields)) => {
                // a scope listed twice collapses into its first entry
                if consumed.insert(key) {
                    references.push(ScopeReference {
                        scope_id: existing.scope_id.clone(),
                        display_name: fields.display_name.clone(),
                        description: fields.description.clone(),
                    });
                }
            }
            None if i == 0 => references.push(existing.clone()),
            None => removed.push(existing.scope_id.clone()),
        }
    }

    let mut added = Vec::new();
    for (key, (scope_id, fields)) in &by_key {
        if consumed.contains(key) {
            continue;
        }
        references.push(ScopeReference::new(
            (*scope_id).clone(),
            fields.display_name.clone(),
            fields.description.clone(),
        ));
        added.push((*scope_id).clone());
    }

    ReferencePlan {
        references,
        added,
        removed,
    }
}

/// Applies reference plans to remote endpoints.
pub struct ReferenceReconciler {
    client: Arc<dyn EndpointClient>,
    timeout: Duration,
    audit: AuditLogger,
}

impl ReferenceReconciler {
    /// `timeout` bounds each remote call.
    pub fn new(client: Arc<dyn EndpointClient>, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            audit: AuditLogger::new_noop(),
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    async fn fetch(
        &self,
        target: &Target,
        id: &EndpointId,
    ) -> Result<ClientResult<ServiceEndpoint>> {
        tokio::time::timeout(self.timeout, self.client.get(id, &target.scope_id))
            .await
            .map_err(|_| timed_out(target, self.timeout))
    }

    async fn store(
        &self,
        target: &Target,
        id: &EndpointId,
        endpoint: &ServiceEndpoint,
    ) -> Result<ServiceEndpoint> {
        tokio::time::timeout(self.timeout, self.client.update(id, endpoint))
            .await
            .map_err(|_| timed_out(target, self.timeout))?
            .map_err(|e| not_found_or_transport(target, e))
    }

    /// Make the endpoint's references match `desired`, read from `scope_id`.
    ///
    /// Always sends exactly one update, even when nothing changed.
    pub async fn reconcile(
        &self,
        id: &EndpointId,
        scope_id: &ScopeId,
        desired: &BTreeMap<ScopeId, ReferenceFields>,
    ) -> Result<ServiceEndpoint> {
        let target = Target::endpoint(id.clone(), scope_id.clone());
        let mut endpoint = self
            .fetch(&target, id)
            .await?
            .map_err(|e| not_found_or_transport(&target, e))?;

        let plan = plan_references(&endpoint.scope_references, desired);
        endpoint.scope_references = plan.references;
        let updated = self.store(&target, id, &endpoint).await?;

        info!(
            endpoint_id = %id,
            added = plan.added.len(),
            removed = plan.removed.len(),
            "Service endpoint references reconciled"
        );
        self.audit.references_updated(id, &plan.added, &plan.removed);
        Ok(updated)
    }

    /// Remove the references to `scopes`, never the owning one.
    ///
    /// An endpoint that no longer exists has nothing left to release.
    pub async fn release(
        &self,
        id: &EndpointId,
        scope_id: &ScopeId,
        scopes: &[ScopeId],
    ) -> Result<()> {
        let target = Target::endpoint(id.clone(), scope_id.clone());
        let mut endpoint = match self.fetch(&target, id).await? {
            Ok(endpoint) => endpoint,
            Err(ClientError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(ReconcileError::transport(target, e)),
        };

        let release: BTreeSet<String> = scopes.iter().map(ScopeId::key).collect();
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(endpoint.scope_references.len());
        for (i, reference) in endpoint.scope_references.into_iter().enumerate() {
            if i > 0 && release.contains(&reference.scope_id.key()) {
                removed.push(reference.scope_id);
            } else {
                kept.push(reference);
            }
        }
        endpoint.scope_references = kept;
        self.store(&target, id, &endpoint).await?;

        info!(endpoint_id = %id, removed = removed.len(), "Service endpoint references released");
        self.audit.references_updated(id, &[], &removed);
        Ok(())
    }
}

fn timed_out(target: &Target, waited: Duration) -> ReconcileError {
    ReconcileError::Timeout {
        target: target.clone(),
        waited,
        last_observed: "no response".to_string(),
    }
}

fn not_found_or_transport(target: &Target, e: ClientError) -> ReconcileError {
    match e {
        ClientError::NotFound(_) => ReconcileError::NotFound {
            target: target.clone(),
        },
        e => ReconcileError::transport(target.clone(), e),
    }
}
