//! Record-level operations: local [`EndpointConfig`] in, local record out.
//!
//! Ties the field adapter of the record's endpoint type to the lifecycle
//! reconciler and the connectivity validator.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::AdapterRegistry;
use crate::audit::AuditLogger;
use crate::client::EndpointClient;
use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, Result, Target};
use crate::ids::parse_import_id;
use crate::lifecycle::LifecycleReconciler;
use crate::model::{ScopeReference, ServiceEndpoint};
use crate::record::EndpointConfig;
use crate::references::ReferenceReconciler;
use crate::validator::ConnectivityValidator;

/// Handler for service endpoint records.
pub struct EndpointResource {
    lifecycle: LifecycleReconciler,
    validator: ConnectivityValidator,
    references: ReferenceReconciler,
    adapters: AdapterRegistry,
}

impl EndpointResource {
    pub fn new(client: Arc<dyn EndpointClient>, config: ReconcilerConfig) -> Self {
        Self::with_audit(client, config, AuditLogger::new_noop())
    }

    pub fn with_audit(
        client: Arc<dyn EndpointClient>,
        config: ReconcilerConfig,
        audit: AuditLogger,
    ) -> Self {
        let validator = ConnectivityValidator::new(Arc::clone(&client), config.validation.clone())
            .with_audit(audit.clone());
        let references = ReferenceReconciler::new(Arc::clone(&client), config.timeouts.update())
            .with_audit(audit.clone());
        let lifecycle = LifecycleReconciler::new(client, config).with_audit(audit);
        Self {
            lifecycle,
            validator,
            references,
            adapters: AdapterRegistry::builtin(),
        }
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn lifecycle(&self) -> &LifecycleReconciler {
        &self.lifecycle
    }

    pub fn validator(&self) -> &ConnectivityValidator {
        &self.validator
    }

    pub fn references(&self) -> &ReferenceReconciler {
        &self.references
    }

    /// Create the endpoint and return the record as read back.
    pub async fn create(
        &self,
        config: &EndpointConfig,
        cancel: &CancellationToken,
    ) -> Result<EndpointConfig> {
        let adapter = self.adapters.get(&config.endpoint_type);
        let timeouts = &self.lifecycle.config().timeouts;
        let ready = self
            .lifecycle
            .create(|| adapter.to_remote(config), timeouts.create(), cancel)
            .await?;
        let Some(id) = ready.id.clone() else {
            return Err(ReconcileError::validation("created service endpoint has no id"));
        };

        if config.features.validate {
            let timeout = self.validator.settings().timeout();
            if let Err(e) = self
                .validator
                .validate(&ready, &config.project_id, timeout, cancel)
                .await
            {
                self.lifecycle
                    .compensate(&id, &config.project_id, &e.to_string())
                    .await;
                return Err(e);
            }
        }

        // the endpoint exists now; never lose its id over a failed read-back
        match self.lifecycle.read(&id, &config.project_id).await {
            Ok(Some(endpoint)) => Ok(adapter.from_remote(&endpoint, config)),
            Ok(None) => {
                warn!(
                    endpoint_id = %id,
                    scope_id = %config.project_id,
                    "Created service endpoint not readable, using create response"
                );
                Ok(adapter.from_remote(&ready, config))
            }
            Err(e) => {
                warn!(
                    endpoint_id = %id,
                    error = %e,
                    "Reading back created service endpoint failed, using create response"
                );
                Ok(adapter.from_remote(&ready, config))
            }
        }
    }

    /// Refresh the record. Its `id` is cleared when the endpoint is gone.
    pub async fn read(&self, config: &EndpointConfig) -> Result<EndpointConfig> {
        let Some(id) = &config.id else {
            return Ok(config.clone());
        };
        match self.lifecycle.read(id, &config.project_id).await? {
            Some(endpoint) => {
                let adapter = self.adapters.get(&endpoint.endpoint_type);
                Ok(adapter.from_remote(&endpoint, config))
            }
            None => {
                info!(
                    endpoint_id = %id,
                    scope_id = %config.project_id,
                    "Service endpoint gone, clearing id"
                );
                let mut absent = config.clone();
                absent.id = None;
                Ok(absent)
            }
        }
    }

    /// Push the record's fields and return the record as read back.
    pub async fn update(
        &self,
        config: &EndpointConfig,
        cancel: &CancellationToken,
    ) -> Result<EndpointConfig> {
        let Some(id) = config.id.clone() else {
            return Err(ReconcileError::validation(format!(
                "service endpoint {:?} has no id, create it first",
                config.name
            )));
        };
        let adapter = self.adapters.get(&config.endpoint_type);
        let mut endpoint = adapter.to_remote(config)?;
        if endpoint.scope_references.is_empty() {
            return Err(ReconcileError::validation(format!(
                "service endpoint {:?} has no scope references",
                config.name
            )));
        }

        // keep references to other scopes, only the owner's fields come from the record
        if let Some(current) = self.lifecycle.read(&id, &config.project_id).await? {
            let owner = endpoint.scope_references.remove(0);
            endpoint.scope_references = current
                .scope_references
                .into_iter()
                .map(|r| {
                    if r.scope_id.same_as(&owner.scope_id) {
                        owner.clone()
                    } else {
                        r
                    }
                })
                .collect();
            if endpoint.scope_references.is_empty() {
                endpoint.scope_references.push(owner);
            }
        }

        if config.features.validate {
            let timeout = self.validator.settings().timeout();
            self.validator
                .validate(&endpoint, &config.project_id, timeout, cancel)
                .await?;
        }

        self.lifecycle.update(&endpoint).await?;
        match self.lifecycle.read(&id, &config.project_id).await? {
            Some(endpoint) => Ok(adapter.from_remote(&endpoint, config)),
            None => Err(ReconcileError::NotFound {
                target: Target::endpoint(id, config.project_id.clone()),
            }),
        }
    }

    /// Delete the endpoint from every scope it is shared with.
    pub async fn delete(&self, config: &EndpointConfig, cancel: &CancellationToken) -> Result<()> {
        let Some(id) = &config.id else {
            return Ok(());
        };
        // An endpoint that reads back without authorization still exists, so
        // fall back to addressing it from the record. Not found is success.
        let endpoint = match self.lifecycle.read(id, &config.project_id).await? {
            Some(endpoint) => endpoint,
            None => {
                debug!(endpoint_id = %id, "Service endpoint not readable, deleting by record");
                ServiceEndpoint {
                    id: Some(id.clone()),
                    name: config.name.clone(),
                    endpoint_type: config.endpoint_type.clone(),
                    scope_references: vec![ScopeReference::new(
                        config.project_id.clone(),
                        config.name.clone(),
                        config.description.clone(),
                    )],
                    ..Default::default()
                }
            }
        };
        let timeout = self.lifecycle.config().timeouts.delete();
        self.lifecycle.delete(&endpoint, timeout, cancel).await
    }

    /// Run the connectivity check for an existing endpoint.
    pub async fn validate(
        &self,
        config: &EndpointConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let adapter = self.adapters.get(&config.endpoint_type);
        let endpoint = adapter.to_remote(config)?;
        let timeout = self.validator.settings().timeout();
        self.validator
            .validate(&endpoint, &config.project_id, timeout, cancel)
            .await
    }

    /// Load a record from a `<scope-id>/<endpoint-id>` import string.
    ///
    /// Secrets are not returned by the service and stay empty.
    pub async fn import(&self, import_id: &str) -> Result<EndpointConfig> {
        let (scope_id, id) = parse_import_id(import_id)?;
        let Some(endpoint) = self.lifecycle.read(&id, &scope_id).await? else {
            return Err(ReconcileError::NotFound {
                target: Target::endpoint(id, scope_id),
            });
        };
        let skeleton = EndpointConfig::new(scope_id, &endpoint.endpoint_type, &endpoint.name);
        let adapter = self.adapters.get(&endpoint.endpoint_type);
        Ok(adapter.from_remote(&endpoint, &skeleton))
    }
}
