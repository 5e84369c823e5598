//! Docker registry endpoints (Docker Hub or any other registry).
//!
//! Attributes: `docker_registry`, `docker_username`, `docker_email`,
//! `registry_type`. Secret: `docker_password`.

use super::{FieldAdapter, base_local, base_remote, is_redacted};
use crate::error::{ReconcileError, Result};
use crate::model::{EndpointAuthorization, ServiceEndpoint};
use crate::record::EndpointConfig;

pub const DOCKER_HUB_REGISTRY: &str = "https://index.docker.io/v1/";
/// The remote UI uses this url for every registry type.
const DOCKER_HUB_URL: &str = "https://hub.docker.com/";

const REGISTRY_TYPES: &[&str] = &["DockerHub", "Others"];

pub struct DockerRegistryAdapter;

impl FieldAdapter for DockerRegistryAdapter {
    fn endpoint_type(&self) -> &str {
        "dockerregistry"
    }

    fn to_remote(&self, config: &EndpointConfig) -> Result<ServiceEndpoint> {
        let registry_type = config.attribute("registry_type").unwrap_or("DockerHub");
        if !REGISTRY_TYPES.contains(&registry_type) {
            return Err(ReconcileError::validation(format!(
                "registry_type must be one of {:?}, got {:?}",
                REGISTRY_TYPES, registry_type
            )));
        }

        let mut endpoint = base_remote(config, self.endpoint_type());
        endpoint.url = Some(DOCKER_HUB_URL.to_string());
        endpoint.authorization = Some(
            EndpointAuthorization::new("UsernamePassword")
                .with_parameter(
                    "registry",
                    config.attribute("docker_registry").unwrap_or(DOCKER_HUB_REGISTRY),
                )
                .with_parameter("username", config.attribute("docker_username").unwrap_or_default())
                .with_parameter("email", config.attribute("docker_email").unwrap_or_default())
                .with_parameter("password", config.secret("docker_password").unwrap_or_default()),
        );
        endpoint
            .data
            .insert("registrytype".to_string(), registry_type.to_string());
        Ok(endpoint)
    }

    fn from_remote(&self, endpoint: &ServiceEndpoint, previous: &EndpointConfig) -> EndpointConfig {
        let mut config = base_local(endpoint, previous);
        if let Some(auth) = &endpoint.authorization {
            for (remote, local) in [
                ("registry", "docker_registry"),
                ("username", "docker_username"),
                ("email", "docker_email"),
            ] {
                if let Some(value) = auth.parameters.get(remote) {
                    config.attributes.insert(local.to_string(), value.clone());
                }
            }
            let echoed = auth.parameters.get("password").filter(|p| !is_redacted(p));
            let kept = previous.authorization.get("docker_password");
            if let Some(password) = echoed.or(kept) {
                config
                    .authorization
                    .insert("docker_password".to_string(), password.clone());
            }
        }
        if let Some(registry_type) = endpoint.data.get("registrytype") {
            config
                .attributes
                .insert("registry_type".to_string(), registry_type.clone());
        }
        config
    }
}
