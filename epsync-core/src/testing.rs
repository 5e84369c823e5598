//! In-memory [`EndpointClient`] for tests.
//!
//! Responses can be scripted per method; when a method's script is empty the
//! client falls back to a small in-memory store that behaves like a remote
//! service whose operations complete instantly.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::client::{ClientResult, EndpointClient};
use crate::error::ClientError;
use crate::ids::{EndpointId, ScopeId};
use crate::model::{
    EndpointType, OperationState, OperationStatus, ProbeRequest, ProbeResult, ServiceEndpoint,
};

/// Number of calls per client method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub create: usize,
    pub get: usize,
    pub get_by_name: usize,
    pub update: usize,
    pub delete: usize,
    pub execute_probe: usize,
    pub list_types: usize,
}

#[derive(Default)]
struct State {
    next_id: usize,
    store: BTreeMap<EndpointId, ServiceEndpoint>,
    types: Vec<EndpointType>,

    creates: VecDeque<ClientResult<ServiceEndpoint>>,
    gets: VecDeque<ClientResult<ServiceEndpoint>>,
    updates: VecDeque<ClientResult<ServiceEndpoint>>,
    deletes: VecDeque<ClientResult<()>>,
    probes: VecDeque<ClientResult<ProbeResult>>,

    calls: Calls,
    created: Vec<ServiceEndpoint>,
    updated: Vec<ServiceEndpoint>,
    deleted: Vec<(EndpointId, Vec<ScopeId>)>,
    probed: Vec<ProbeRequest>,
}

/// Scriptable in-memory endpoint service.
#[derive(Default)]
pub struct ScriptedClient {
    state: Mutex<State>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed the store with an existing endpoint. It must carry an id.
    pub fn insert(&self, endpoint: ServiceEndpoint) {
        if let Some(id) = endpoint.id.clone() {
            self.state().store.insert(id, endpoint);
        }
    }

    pub fn set_types(&self, types: Vec<EndpointType>) {
        self.state().types = types;
    }

    pub fn push_create(&self, response: ClientResult<ServiceEndpoint>) {
        self.state().creates.push_back(response);
    }

    pub fn push_get(&self, response: ClientResult<ServiceEndpoint>) {
        self.state().gets.push_back(response);
    }

    pub fn push_update(&self, response: ClientResult<ServiceEndpoint>) {
        self.state().updates.push_back(response);
    }

    pub fn push_delete(&self, response: ClientResult<()>) {
        self.state().deletes.push_back(response);
    }

    pub fn push_probe(&self, response: ClientResult<ProbeResult>) {
        self.state().probes.push_back(response);
    }

    pub fn calls(&self) -> Calls {
        self.state().calls
    }

    /// Request bodies passed to `create`.
    pub fn created(&self) -> Vec<ServiceEndpoint> {
        self.state().created.clone()
    }

    /// Request bodies passed to `update`.
    pub fn updated(&self) -> Vec<ServiceEndpoint> {
        self.state().updated.clone()
    }

    /// Arguments passed to `delete`.
    pub fn deleted(&self) -> Vec<(EndpointId, Vec<ScopeId>)> {
        self.state().deleted.clone()
    }

    pub fn probed(&self) -> Vec<ProbeRequest> {
        self.state().probed.clone()
    }

    pub fn stored(&self, id: &EndpointId) -> Option<ServiceEndpoint> {
        self.state().store.get(id).cloned()
    }
}

fn not_found(id: &EndpointId) -> ClientError {
    ClientError::NotFound(format!("service endpoint {} does not exist", id))
}

#[async_trait]
impl EndpointClient for ScriptedClient {
    async fn create(&self, endpoint: &ServiceEndpoint) -> ClientResult<ServiceEndpoint> {
        let mut state = self.state();
        state.calls.create += 1;
        state.created.push(endpoint.clone());

        let response = match state.creates.pop_front() {
            Some(response) => response,
            None => {
                state.next_id += 1;
                let mut created = endpoint.clone();
                created.id = Some(EndpointId::new(format!("e{}", state.next_id)));
                created.is_ready = Some(true);
                created.operation_status = Some(OperationStatus::from_state(OperationState::Ready));
                Ok(created)
            }
        };
        if let Ok(created) = &response {
            if let Some(id) = created.id.clone() {
                state.store.insert(id, created.clone());
            }
        }
        response
    }

    async fn get(&self, id: &EndpointId, _scope_id: &ScopeId) -> ClientResult<ServiceEndpoint> {
        let mut state = self.state();
        state.calls.get += 1;
        match state.gets.pop_front() {
            Some(response) => response,
            None => state.store.get(id).cloned().ok_or_else(|| not_found(id)),
        }
    }

    async fn get_by_name(
        &self,
        scope_id: &ScopeId,
        name: &str,
    ) -> ClientResult<Vec<ServiceEndpoint>> {
        let mut state = self.state();
        state.calls.get_by_name += 1;
        Ok(state
            .store
            .values()
            .filter(|e| e.name == name)
            .filter(|e| e.scope_references.iter().any(|r| r.scope_id.same_as(scope_id)))
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        id: &EndpointId,
        endpoint: &ServiceEndpoint,
    ) -> ClientResult<ServiceEndpoint> {
        let mut state = self.state();
        state.calls.update += 1;
        state.updated.push(endpoint.clone());

        if let Some(response) = state.updates.pop_front() {
            return response;
        }
        if !state.store.contains_key(id) {
            return Err(not_found(id));
        }
        let mut updated = endpoint.clone();
        updated.id = Some(id.clone());
        state.store.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: &EndpointId, scope_ids: &[ScopeId]) -> ClientResult<()> {
        let mut state = self.state();
        state.calls.delete += 1;
        state.deleted.push((id.clone(), scope_ids.to_vec()));

        let response = match state.deletes.pop_front() {
            Some(response) => response,
            None if state.store.contains_key(id) => Ok(()),
            None => Err(not_found(id)),
        };
        if response.is_ok() {
            state.store.remove(id);
        }
        response
    }

    async fn execute_probe(&self, request: &ProbeRequest) -> ClientResult<ProbeResult> {
        let mut state = self.state();
        state.calls.execute_probe += 1;
        state.probed.push(request.clone());
        state.probes.pop_front().unwrap_or_else(|| Ok(ProbeResult::ok()))
    }

    async fn list_types(&self) -> ClientResult<Vec<EndpointType>> {
        let mut state = self.state();
        state.calls.list_types += 1;
        Ok(state.types.clone())
    }
}
