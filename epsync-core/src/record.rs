//! Flat local configuration record of a service endpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{EndpointId, ScopeId};

pub const DEFAULT_DESCRIPTION: &str = "Managed by epsync";

fn default_description() -> String {
    DEFAULT_DESCRIPTION.to_string()
}

/// Optional behaviours of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Run a connectivity check after create and before update.
    pub validate: bool,
}

/// What the caller manages locally. Which keys of `authorization` and
/// `attributes` mean something depends on the endpoint type's adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Cleared whenever the endpoint is observed missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EndpointId>,
    pub project_id: ScopeId,
    #[serde(rename = "type")]
    pub endpoint_type: String,
    pub name: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_scheme: Option<String>,
    /// Secret values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authorization: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub features: Features,
}

impl EndpointConfig {
    pub fn new(project_id: ScopeId, endpoint_type: &str, name: &str) -> Self {
        Self {
            id: None,
            project_id,
            endpoint_type: endpoint_type.to_string(),
            name: name.to_string(),
            description: default_description(),
            url: None,
            auth_scheme: None,
            authorization: BTreeMap::new(),
            attributes: BTreeMap::new(),
            features: Features::default(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn secret(&self, key: &str) -> Option<&str> {
        self.authorization
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// The `<scope-id>/<endpoint-id>` string this record can be imported with.
    pub fn import_id(&self) -> Option<String> {
        self.id
            .as_ref()
            .map(|id| format!("{}/{}", self.project_id, id))
    }
}
