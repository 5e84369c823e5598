//! Field adapters: per endpoint type mapping between the flat local
//! [`EndpointConfig`] and the remote [`ServiceEndpoint`].
//!
//! Adapters are pure. They are looked up by endpoint type in an
//! [`AdapterRegistry`]; types without a dedicated adapter use [`GenericAdapter`].

pub mod docker_registry;
pub mod generic;
pub mod github;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub use docker_registry::DockerRegistryAdapter;
pub use generic::GenericAdapter;
pub use github::GitHubAdapter;

use crate::error::Result;
use crate::model::{OWNER_LIBRARY, ScopeReference, ServiceEndpoint};
use crate::record::EndpointConfig;

/// Mapping between local records and remote endpoints for one endpoint type.
pub trait FieldAdapter: Send + Sync {
    /// Remote type tag this adapter handles.
    fn endpoint_type(&self) -> &str;

    /// Build the remote endpoint for a local record.
    fn to_remote(&self, config: &EndpointConfig) -> Result<ServiceEndpoint>;

    /// Build the local record for a remote endpoint.
    ///
    /// Secrets are never echoed back by the service, so they are carried
    /// over from `previous`.
    fn from_remote(&self, endpoint: &ServiceEndpoint, previous: &EndpointConfig) -> EndpointConfig;
}

/// Adapters by endpoint type.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn FieldAdapter>>,
    fallback: Arc<dyn FieldAdapter>,
}

impl AdapterRegistry {
    /// Registry with only the generic fallback.
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
            fallback: Arc::new(GenericAdapter),
        }
    }

    /// Registry with all built-in adapters.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(GitHubAdapter));
        registry.register(Arc::new(DockerRegistryAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn FieldAdapter>) {
        self.adapters
            .insert(adapter.endpoint_type().to_lowercase(), adapter);
    }

    /// Adapter for a type, falling back to the generic one.
    pub fn get(&self, endpoint_type: &str) -> Arc<dyn FieldAdapter> {
        self.adapters
            .get(&endpoint_type.to_lowercase())
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Types with a dedicated adapter, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.adapters.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Fields shared by all endpoint types.
pub(crate) fn base_remote(config: &EndpointConfig, endpoint_type: &str) -> ServiceEndpoint {
    ServiceEndpoint {
        id: config.id.clone(),
        name: config.name.clone(),
        endpoint_type: endpoint_type.to_string(),
        description: config.description.clone(),
        url: config.url.clone(),
        owner: Some(OWNER_LIBRARY.to_string()),
        scope_references: vec![ScopeReference::new(
            config.project_id.clone(),
            config.name.clone(),
            config.description.clone(),
        )],
        ..Default::default()
    }
}

pub(crate) fn base_local(endpoint: &ServiceEndpoint, previous: &EndpointConfig) -> EndpointConfig {
    EndpointConfig {
        id: endpoint.id.clone(),
        project_id: previous.project_id.clone(),
        endpoint_type: endpoint.endpoint_type.clone(),
        name: endpoint.name.clone(),
        description: endpoint.description.clone(),
        url: endpoint.url.clone(),
        auth_scheme: endpoint.scheme().map(str::to_string),
        authorization: BTreeMap::new(),
        attributes: BTreeMap::new(),
        features: previous.features.clone(),
    }
}

/// Whether a value echoed by the service hides the real one.
pub(crate) fn is_redacted(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.chars().all(|c| c == '*')
}

/// Previous secrets, overridden by echoed values that are not redacted.
pub(crate) fn merge_secrets(
    previous: &BTreeMap<String, String>,
    echoed: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = previous.clone();
    for (key, value) in echoed {
        if !is_redacted(value) {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
