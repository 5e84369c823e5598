//! Cached catalog of the endpoint types the remote service supports.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::client::EndpointClient;
use crate::error::{ReconcileError, Result, Target};
use crate::model::{EndpointType, InputDescriptor, ServiceEndpoint};

type Types = Arc<BTreeMap<String, EndpointType>>;

/// Lazily loaded, read-mostly cache of [`EndpointType`]s.
///
/// The first check loads the catalog through `list_types`; later checks only
/// take the read lock.
pub struct TypeCatalog {
    client: Arc<dyn EndpointClient>,
    types: RwLock<Option<Types>>,
}

impl TypeCatalog {
    pub fn new(client: Arc<dyn EndpointClient>) -> Self {
        Self {
            client,
            types: RwLock::new(None),
        }
    }

    /// All known types, loading them on first use.
    pub async fn types(&self, target: &Target) -> Result<Types> {
        {
            let types = self.types.read().await;
            if let Some(types) = types.as_ref() {
                return Ok(Arc::clone(types));
            }
        }

        let mut types = self.types.write().await;
        if let Some(types) = types.as_ref() {
            return Ok(Arc::clone(types));
        }

        let listed = self
            .client
            .list_types()
            .await
            .map_err(|e| ReconcileError::transport(target.clone(), e))?;
        if listed.is_empty() {
            return Err(ReconcileError::validation(
                "the remote service reported no service endpoint types",
            ));
        }
        debug!(count = listed.len(), "Loaded service endpoint types");

        let loaded: Types = Arc::new(
            listed
                .into_iter()
                .map(|t| (t.name.clone(), t))
                .collect(),
        );
        *types = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Drop the cached catalog so the next check reloads it.
    pub async fn invalidate(&self) {
        *self.types.write().await = None;
    }

    /// Reject an endpoint whose type, scheme or keys the service does not support.
    pub async fn check(&self, target: &Target, endpoint: &ServiceEndpoint) -> Result<()> {
        let types = self.types(target).await?;

        let Some(endpoint_type) = types.get(&endpoint.endpoint_type) else {
            let valid = types
                .values()
                .map(|t| match &t.display_name {
                    Some(display) => format!("{}: {}", display, t.name),
                    None => t.name.clone(),
                })
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ReconcileError::validation(format!(
                "service endpoint type '{}' is not available. Valid types are:\n{}",
                endpoint.endpoint_type, valid
            )));
        };

        check_fields(
            &endpoint.data,
            &endpoint_type.input_descriptors,
            "data",
            &endpoint_type.name,
        )?;

        let scheme = endpoint.scheme().unwrap_or_default();
        let Some(auth) = endpoint_type
            .authentication_schemes
            .iter()
            .find(|s| s.scheme == scheme)
        else {
            let supported = endpoint_type
                .authentication_schemes
                .iter()
                .map(|s| s.scheme.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ReconcileError::validation(format!(
                "service endpoint type '{}' does not support authentication scheme '{}'. \
                 Supported schemes: [{}]",
                endpoint_type.name, scheme, supported
            )));
        };

        let empty = BTreeMap::new();
        let parameters = endpoint
            .authorization
            .as_ref()
            .map(|a| &a.parameters)
            .unwrap_or(&empty);
        check_fields(parameters, &auth.input_descriptors, "auth", &endpoint_type.name)
    }
}

fn check_fields(
    fields: &BTreeMap<String, String>,
    possible: &[InputDescriptor],
    kind: &str,
    type_name: &str,
) -> Result<()> {
    if fields.is_empty() {
        warn!(
            endpoint_type = %type_name,
            "No {} fields to validate, skipping (sensitive or not yet known values)",
            kind
        );
        return Ok(());
    }

    if let Some(unsupported) = fields.keys().find(|k| !possible.iter().any(|d| &d.id == *k)) {
        let supported = possible
            .iter()
            .map(|d| d.id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ReconcileError::validation(format!(
            "service endpoint type '{}' does not support {} field '{}'. Supported fields: {{{}}}",
            type_name, kind, unsupported, supported
        )));
    }

    let missing = possible
        .iter()
        .filter(|d| d.is_required() && !fields.contains_key(&d.id))
        .map(|d| match &d.name {
            Some(name) => format!("{} ({})", d.id, name),
            None => d.id.clone(),
        })
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(ReconcileError::validation(format!(
            "service endpoint type '{}' is missing required {} fields: {{{}}}",
            type_name,
            kind,
            missing.join(", ")
        )));
    }
    Ok(())
}
