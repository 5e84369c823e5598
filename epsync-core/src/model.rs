//! Wire model of a service endpoint as exchanged with the remote service.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EndpointId, ScopeId};

/// Owner tag for endpoints managed from here.
pub const OWNER_LIBRARY: &str = "library";

/// Data source name used for connectivity probes.
pub const TEST_CONNECTION_DATA_SOURCE: &str = "TestConnection";

/// State of an out-of-band provisioning or teardown operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationState {
    Pending,
    InProgress,
    Ready,
    Failed,
}

impl OperationState {
    /// Parse a remote state string. Unknown values yield `None`, never `Failed`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        [
            OperationState::Pending,
            OperationState::InProgress,
            OperationState::Ready,
            OperationState::Failed,
        ]
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(raw))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "Pending",
            OperationState::InProgress => "InProgress",
            OperationState::Ready => "Ready",
            OperationState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Ready | OperationState::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `operationStatus` payload.
///
/// Its shape is not pinned down by the remote API, so it is kept as raw JSON
/// and only the `state` field is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationStatus(pub Value);

impl OperationStatus {
    pub fn from_state(state: OperationState) -> Self {
        Self(serde_json::json!({ "state": state.as_str() }))
    }

    /// The raw `state` string, if the payload carries one.
    pub fn raw_state(&self) -> Option<&str> {
        match &self.0 {
            Value::Object(map) => map.get("state").and_then(Value::as_str),
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn state(&self) -> Option<OperationState> {
        self.raw_state().and_then(OperationState::parse)
    }

    /// The payload rendered for diagnostics.
    pub fn payload(&self) -> String {
        self.0.to_string()
    }
}

/// Authorization block of an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAuthorization {
    pub scheme: String,
    /// Secret parameters come back as `null`; those keys are dropped.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "non_null_entries"
    )]
    pub parameters: BTreeMap<String, String>,
}

fn non_null_entries<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect())
}

impl EndpointAuthorization {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Grants one scope permission to use an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireProjectReference", into = "WireProjectReference")]
pub struct ScopeReference {
    pub scope_id: ScopeId,
    pub display_name: String,
    pub description: String,
}

impl ScopeReference {
    pub fn new(
        scope_id: ScopeId,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            scope_id,
            display_name: display_name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProjectReference {
    project_reference: WireProject,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireProject {
    id: ScopeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl From<WireProjectReference> for ScopeReference {
    fn from(w: WireProjectReference) -> Self {
        Self {
            scope_id: w.project_reference.id,
            display_name: w.name.unwrap_or_default(),
            description: w.description.unwrap_or_default(),
        }
    }
}

impl From<ScopeReference> for WireProjectReference {
    fn from(r: ScopeReference) -> Self {
        Self {
            project_reference: WireProject {
                id: r.scope_id,
                name: None,
            },
            name: Some(r.display_name),
            description: Some(r.description),
        }
    }
}

/// Canonical representation of a remote service endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EndpointId>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub endpoint_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<EndpointAuthorization>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    #[serde(default, rename = "serviceEndpointProjectReferences")]
    pub scope_references: Vec<ScopeReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_status: Option<OperationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ready: Option<bool>,
}

impl ServiceEndpoint {
    /// The creating/owning scope: the first scope reference.
    pub fn owner_scope(&self) -> Option<&ScopeId> {
        self.scope_references.first().map(|r| &r.scope_id)
    }

    pub fn scope_ids(&self) -> Vec<ScopeId> {
        self.scope_references
            .iter()
            .map(|r| r.scope_id.clone())
            .collect()
    }

    pub fn scheme(&self) -> Option<&str> {
        self.authorization.as_ref().map(|a| a.scheme.as_str())
    }
}

/// Endpoint fields sent along with a probe request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDetails {
    #[serde(rename = "type")]
    pub endpoint_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<EndpointAuthorization>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Data source the probe executes against the endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceDetails {
    pub data_source_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

/// A connectivity/validation probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub endpoint_id: Option<EndpointId>,
    pub scope_id: ScopeId,
    pub details: EndpointDetails,
    pub data_source: DataSourceDetails,
}

impl ProbeRequest {
    /// Test-connection probe for the endpoint's current fields.
    pub fn test_connection(endpoint: &ServiceEndpoint, scope_id: ScopeId) -> Self {
        Self {
            endpoint_id: endpoint.id.clone(),
            scope_id,
            details: EndpointDetails {
                endpoint_type: endpoint.endpoint_type.clone(),
                url: endpoint.url.clone(),
                authorization: endpoint.authorization.clone(),
                data: endpoint.data.clone(),
            },
            data_source: DataSourceDetails {
                data_source_name: TEST_CONNECTION_DATA_SOURCE.to_string(),
                parameters: BTreeMap::new(),
            },
        }
    }
}

/// Response of a probe. The RPC succeeded; `status_code` says whether the
/// remote side could actually talk to the endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    #[serde(default)]
    pub status_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ProbeResult {
    pub fn ok() -> Self {
        Self {
            status_code: "ok".to_string(),
            ..Default::default()
        }
    }

    pub fn failed(status_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code: status_code.into(),
            error_message: Some(message.into()),
            result: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status_code.trim().eq_ignore_ascii_case("ok")
    }
}

/// Validation rules of an input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValidation {
    #[serde(default)]
    pub is_required: Option<bool>,
}

/// One input (data key or authorization parameter) of an endpoint type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub validation: Option<InputValidation>,
}

impl InputDescriptor {
    pub fn is_required(&self) -> bool {
        self.validation
            .as_ref()
            .and_then(|v| v.is_required)
            .unwrap_or(false)
    }
}

/// An authentication scheme supported by an endpoint type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationScheme {
    pub scheme: String,
    #[serde(default)]
    pub input_descriptors: Vec<InputDescriptor>,
}

/// An endpoint type known to the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointType {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub authentication_schemes: Vec<AuthenticationScheme>,
    #[serde(default)]
    pub input_descriptors: Vec<InputDescriptor>,
}
