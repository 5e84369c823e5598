//! Remote endpoint service client abstraction.
//!
//! The reconcilers only talk to the remote service through [`EndpointClient`],
//! so the wire protocol (REST, a test double, ...) is pluggable.

use async_trait::async_trait;

use crate::error::ClientError;
use crate::ids::{EndpointId, ScopeId};
use crate::model::{EndpointType, ProbeRequest, ProbeResult, ServiceEndpoint};

/// Result type for raw client calls.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Operations the remote endpoint service exposes.
#[async_trait]
pub trait EndpointClient: Send + Sync {
    /// Create an endpoint. The returned object carries the assigned id.
    async fn create(&self, endpoint: &ServiceEndpoint) -> ClientResult<ServiceEndpoint>;

    /// Fetch an endpoint as seen from `scope_id`.
    async fn get(&self, id: &EndpointId, scope_id: &ScopeId) -> ClientResult<ServiceEndpoint>;

    /// List endpoints in `scope_id` with the given name.
    async fn get_by_name(&self, scope_id: &ScopeId, name: &str)
    -> ClientResult<Vec<ServiceEndpoint>>;

    /// Replace an endpoint's fields, including its scope references.
    async fn update(&self, id: &EndpointId, endpoint: &ServiceEndpoint)
    -> ClientResult<ServiceEndpoint>;

    /// Delete an endpoint from the given scopes.
    async fn delete(&self, id: &EndpointId, scope_ids: &[ScopeId]) -> ClientResult<()>;

    /// Execute a probe against an endpoint. Success of the call says nothing
    /// about the endpoint; inspect [`ProbeResult::status_code`].
    async fn execute_probe(&self, request: &ProbeRequest) -> ClientResult<ProbeResult>;

    /// List the endpoint types the service supports.
    async fn list_types(&self) -> ClientResult<Vec<EndpointType>>;
}
