//! Create, update, delete and read service endpoints, waiting for the remote
//! service's out-of-band operations to converge.
//!
//! A create moves through `Submitted -> AwaitingReady -> Ready`; if it does
//! not become ready the endpoint is deleted again (compensation) and the
//! readiness error is returned. A delete moves through
//! `AwaitingDeleted -> Deleted`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::AuditLogger;
use crate::catalog::TypeCatalog;
use crate::client::{ClientResult, EndpointClient};
use crate::config::ReconcilerConfig;
use crate::error::{ClientError, ReconcileError, Result, Target};
use crate::ids::{EndpointId, ScopeId};
use crate::model::{OWNER_LIBRARY, OperationState, ServiceEndpoint};
use crate::poller::{Observation, PollConfig, await_terminal};

/// Endpoint type and scheme that can only be created on the GitHub side.
const GITHUB_TYPE: &str = "github";
const GITHUB_APP_SCHEME: &str = "InstallationToken";

/// Derive the provisioning state of a freshly read endpoint.
///
/// `isReady == true` wins outright. Otherwise the `operationStatus.state` is
/// used. Anything else is inconclusive and keeps the wait going.
pub fn readiness(endpoint: ServiceEndpoint) -> Observation<ServiceEndpoint> {
    let detail = endpoint.operation_status.as_ref().map(|s| s.payload());
    if endpoint.is_ready == Some(true) {
        return Observation::new(endpoint, OperationState::Ready);
    }
    let state = endpoint
        .operation_status
        .as_ref()
        .and_then(|s| s.state())
        .unwrap_or(OperationState::Pending);
    let observation = Observation::new(endpoint, state);
    match detail {
        Some(detail) => observation.with_detail(detail),
        None => observation,
    }
}

/// Derive the teardown state from a status read after delete was submitted.
///
/// Not found, or an endpoint without `operationStatus`, means gone.
pub fn teardown(
    read: ClientResult<ServiceEndpoint>,
) -> std::result::Result<Observation<()>, ClientError> {
    let endpoint = match read {
        Ok(endpoint) => endpoint,
        Err(ClientError::NotFound(_)) => return Ok(Observation::new((), OperationState::Ready)),
        Err(e) => return Err(e),
    };
    let Some(status) = endpoint.operation_status else {
        return Ok(Observation::new((), OperationState::Ready));
    };
    let state = status.state().unwrap_or(OperationState::InProgress);
    Ok(Observation::new((), state).with_detail(status.payload()))
}

/// Checks that need no remote call.
pub fn check_create(endpoint: &ServiceEndpoint) -> Result<()> {
    if endpoint.scope_references.is_empty() {
        return Err(ReconcileError::validation(format!(
            "service endpoint {:?} has no scope references",
            endpoint.name
        )));
    }
    if let Some(id) = &endpoint.id {
        return Err(ReconcileError::validation(format!(
            "service endpoint {:?} already has id {}",
            endpoint.name, id
        )));
    }
    if endpoint.name.trim().is_empty() {
        return Err(ReconcileError::validation("service endpoint name is required"));
    }
    if endpoint.endpoint_type.trim().is_empty() {
        return Err(ReconcileError::validation(format!(
            "service endpoint {:?} has no type",
            endpoint.name
        )));
    }
    check_github_app(endpoint)
}

fn check_github_app(endpoint: &ServiceEndpoint) -> Result<()> {
    if endpoint.endpoint_type.eq_ignore_ascii_case(GITHUB_TYPE)
        && endpoint
            .scheme()
            .is_some_and(|s| s.eq_ignore_ascii_case(GITHUB_APP_SCHEME))
    {
        return Err(ReconcileError::validation(
            "GitHub service endpoints using the GitHub App (InstallationToken) cannot be created \
             or updated from here; create them on GitHub and import them",
        ));
    }
    Ok(())
}

/// Lifecycle reconciler for service endpoints.
pub struct LifecycleReconciler {
    client: Arc<dyn EndpointClient>,
    config: ReconcilerConfig,
    catalog: Option<TypeCatalog>,
    audit: AuditLogger,
}

impl LifecycleReconciler {
    pub fn new(client: Arc<dyn EndpointClient>, config: ReconcilerConfig) -> Self {
        let catalog = config
            .check_types
            .then(|| TypeCatalog::new(Arc::clone(&client)));
        Self {
            client,
            config,
            catalog,
            audit: AuditLogger::new_noop(),
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn client(&self) -> &Arc<dyn EndpointClient> {
        &self.client
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    fn poll_config(&self, timeout: Duration) -> PollConfig {
        PollConfig::new(&self.config.poll, timeout)
    }

    /// Run a single client call under a deadline.
    async fn bounded<T>(
        &self,
        target: &Target,
        limit: Duration,
        call: impl Future<Output = ClientResult<T>>,
    ) -> Result<ClientResult<T>> {
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| ReconcileError::Timeout {
                target: target.clone(),
                waited: limit,
                last_observed: "no response".to_string(),
            })
    }

    /// Build, submit and wait for a new endpoint to become ready.
    ///
    /// If the endpoint does not become ready it is deleted again and the
    /// readiness error is returned.
    pub async fn create<F>(
        &self,
        build: F,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ServiceEndpoint>
    where
        F: FnOnce() -> Result<ServiceEndpoint>,
    {
        let mut endpoint = build()?;
        check_create(&endpoint)?;
        if endpoint.owner.is_none() {
            endpoint.owner = Some(OWNER_LIBRARY.to_string());
        }

        let owner = endpoint.scope_references[0].scope_id.clone();
        let unsaved = Target::new(None, owner.clone());
        if let Some(catalog) = &self.catalog {
            catalog.check(&unsaved, &endpoint).await?;
        }

        // Submitted
        let created = self
            .client
            .create(&endpoint)
            .await
            .map_err(|e| ReconcileError::transport(unsaved.clone(), e))?;
        let Some(id) = created.id.clone() else {
            return Err(ReconcileError::transport(
                unsaved,
                ClientError::Transport("create returned no service endpoint id".to_string()),
            ));
        };
        let target = Target::endpoint(id.clone(), owner.clone());
        info!(
            endpoint_id = %id,
            scope_id = %owner,
            name = %endpoint.name,
            "Service endpoint submitted"
        );

        // AwaitingReady
        match self.await_ready(&target, timeout, cancel).await {
            Ok(ready) => {
                info!(endpoint_id = %id, scope_id = %owner, "Service endpoint ready");
                self.audit.endpoint_created(&id, &ready.name, &owner);
                Ok(ready)
            }
            Err(e) => {
                self.compensate(&id, &owner, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Poll an endpoint until it reports ready.
    pub async fn await_ready(
        &self,
        target: &Target,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ServiceEndpoint> {
        let Some(id) = target.endpoint_id.as_ref() else {
            return Err(ReconcileError::validation("cannot wait for an unsaved service endpoint"));
        };
        let client = &self.client;
        let scope_id = &target.scope_id;
        await_terminal(target, &self.poll_config(timeout), cancel, move || async move {
            match client.get(id, scope_id).await {
                Ok(endpoint) => Ok(readiness(endpoint)),
                Err(e) if e.is_not_found() => Err(ReconcileError::StateFetch {
                    target: target.clone(),
                    source: e,
                }),
                Err(e) => Err(ReconcileError::transport(target.clone(), e)),
            }
        })
        .await
    }

    /// Best-effort delete of an endpoint that must not be left behind.
    ///
    /// Failures are logged and audited, never returned.
    pub async fn compensate(&self, id: &EndpointId, owner: &ScopeId, reason: &str) {
        warn!(endpoint_id = %id, scope_id = %owner, reason, "Rolling back service endpoint");
        match self.client.delete(id, std::slice::from_ref(owner)).await {
            Ok(()) => self.audit.endpoint_compensated(id, owner, reason),
            Err(e) => {
                warn!(
                    endpoint_id = %id,
                    scope_id = %owner,
                    error = %e,
                    "Failed to roll back service endpoint"
                );
                self.audit.compensation_failed(id, owner, &e.to_string());
            }
        }
    }

    /// Replace an endpoint's fields. A single call, no waiting.
    pub async fn update(&self, endpoint: &ServiceEndpoint) -> Result<ServiceEndpoint> {
        let (id, owner) = addressed(endpoint)?;
        check_github_app(endpoint)?;
        let target = Target::endpoint(id.clone(), owner);

        let updated = self
            .bounded(&target, self.config.timeouts.update(), self.client.update(&id, endpoint))
            .await?
            .map_err(|e| match e {
                ClientError::NotFound(_) => ReconcileError::NotFound {
                    target: target.clone(),
                },
                e => ReconcileError::transport(target.clone(), e),
            })?;
        debug!(endpoint_id = %id, "Service endpoint updated");
        self.audit.endpoint_updated(&id, &endpoint.name);
        Ok(updated)
    }

    /// Delete an endpoint from all its scopes and wait until it is gone.
    ///
    /// Deleting an endpoint that does not exist succeeds.
    pub async fn delete(
        &self,
        endpoint: &ServiceEndpoint,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (id, owner) = addressed(endpoint)?;
        let scope_ids = endpoint.scope_ids();
        let target = Target::endpoint(id.clone(), owner);

        match self.client.delete(&id, &scope_ids).await {
            Ok(()) => {}
            Err(ClientError::NotFound(_)) => {
                info!(endpoint_id = %id, "Service endpoint already deleted");
                return Ok(());
            }
            Err(e) => return Err(ReconcileError::transport(target, e)),
        }

        // AwaitingDeleted
        let client = &self.client;
        let scope_id = &target.scope_id;
        let target_ref = &target;
        let id_ref = &id;
        await_terminal(&target, &self.poll_config(timeout), cancel, move || async move {
            teardown(client.get(id_ref, scope_id).await)
                .map_err(|e| ReconcileError::transport(target_ref.clone(), e))
        })
        .await?;

        info!(endpoint_id = %id, "Service endpoint deleted");
        self.audit.endpoint_deleted(&id, &scope_ids);
        Ok(())
    }

    /// Fetch an endpoint. `None` when it no longer exists.
    ///
    /// An endpoint that comes back without authorization is treated as gone
    /// as well: it was deleted from, or never shared with, this scope.
    pub async fn read(
        &self,
        id: &EndpointId,
        scope_id: &ScopeId,
    ) -> Result<Option<ServiceEndpoint>> {
        let target = Target::endpoint(id.clone(), scope_id.clone());
        let endpoint = match self
            .bounded(&target, self.config.timeouts.read(), self.client.get(id, scope_id))
            .await?
        {
            Ok(endpoint) => endpoint,
            Err(ClientError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(ReconcileError::transport(target, e)),
        };
        if endpoint.id.is_none() || endpoint.authorization.is_none() {
            debug!(
                endpoint_id = %id,
                scope_id = %scope_id,
                "Service endpoint incomplete, treating as absent"
            );
            return Ok(None);
        }
        Ok(Some(endpoint))
    }

    /// Look up a single endpoint by name.
    pub async fn find_by_name(&self, scope_id: &ScopeId, name: &str) -> Result<ServiceEndpoint> {
        let target = Target::new(None, scope_id.clone());
        let mut found = self
            .bounded(&target, self.config.timeouts.read(), self.client.get_by_name(scope_id, name))
            .await?
            .map_err(|e| ReconcileError::transport(target.clone(), e))?;
        match found.len() {
            0 => Err(ReconcileError::NotFound { target }),
            1 => Ok(found.remove(0)),
            count => Err(ReconcileError::Ambiguous {
                scope_id: scope_id.clone(),
                name: name.to_string(),
                count,
            }),
        }
    }
}

/// Id and owning scope of an endpoint that already exists remotely.
fn addressed(endpoint: &ServiceEndpoint) -> Result<(EndpointId, ScopeId)> {
    let Some(id) = endpoint.id.clone() else {
        return Err(ReconcileError::validation(format!(
            "service endpoint {:?} has no id",
            endpoint.name
        )));
    };
    let Some(owner) = endpoint.owner_scope().cloned() else {
        return Err(ReconcileError::validation(format!(
            "service endpoint {} has no scope references",
            id
        )));
    };
    Ok((id, owner))
}
