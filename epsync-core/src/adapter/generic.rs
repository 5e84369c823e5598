//! Pass-through adapter for any endpoint type.
//!
//! `auth_scheme` and `authorization` become the authorization block,
//! `attributes` become `data`.

use super::{FieldAdapter, base_local, base_remote, merge_secrets};
use crate::error::{ReconcileError, Result};
use crate::model::{EndpointAuthorization, ServiceEndpoint};
use crate::record::EndpointConfig;

pub struct GenericAdapter;

impl FieldAdapter for GenericAdapter {
    fn endpoint_type(&self) -> &str {
        "generic"
    }

    fn to_remote(&self, config: &EndpointConfig) -> Result<ServiceEndpoint> {
        let Some(scheme) = config.auth_scheme.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Err(ReconcileError::validation(format!(
                "service endpoint {:?} of type {} needs an auth_scheme",
                config.name, config.endpoint_type
            )));
        };
        let mut endpoint = base_remote(config, &config.endpoint_type);
        endpoint.authorization = Some(EndpointAuthorization {
            scheme: scheme.to_string(),
            parameters: config.authorization.clone(),
        });
        endpoint.data = config.attributes.clone();
        Ok(endpoint)
    }

    fn from_remote(&self, endpoint: &ServiceEndpoint, previous: &EndpointConfig) -> EndpointConfig {
        let mut config = base_local(endpoint, previous);
        let echoed = endpoint
            .authorization
            .as_ref()
            .map(|a| a.parameters.clone())
            .unwrap_or_default();
        config.authorization = merge_secrets(&previous.authorization, &echoed);
        config.attributes = endpoint.data.clone();
        config
    }
}
