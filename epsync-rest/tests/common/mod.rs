//! Stub of the service endpoint REST API for client tests.
//!
//! Serves a single organization `org` and project `p1` from memory.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use epsync_rest::{RestClient, RestConfig};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const TOKEN: &str = "pat-123";

/// Url the stubbed test connection always fails for.
pub const UNREACHABLE_URL: &str = "https://unreachable.example.com";

/// A request as seen by the stub.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: &'static str,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Value,
}

#[derive(Default)]
pub struct Stub {
    pub endpoints: Mutex<BTreeMap<String, Value>>,
    pub requests: Mutex<Vec<Recorded>>,
    next_id: Mutex<usize>,
}

type Shared = Arc<Stub>;

impl Stub {
    fn record(
        &self,
        method: &'static str,
        path: String,
        query: HashMap<String, String>,
        body: Value,
    ) {
        self.requests.lock().unwrap().push(Recorded {
            method,
            path,
            query,
            body,
        });
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "TF400813: The user is not authorized to access this resource."})),
    )
        .into_response()
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"message": format!("Service endpoint with id {} does not exist.", id)})),
    )
        .into_response()
}

async fn create_endpoint(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(mut body): Json<Value>,
) -> Response {
    stub.record("POST", "endpoints".into(), query, body.clone());
    if !authorized(&headers) {
        return unauthorized();
    }
    let id = {
        let mut next = stub.next_id.lock().unwrap();
        *next += 1;
        format!("e{}", *next)
    };
    body["id"] = json!(id);
    body["isReady"] = json!(false);
    body["operationStatus"] = json!({"state": "InProgress", "statusMessage": ""});
    stub.endpoints.lock().unwrap().insert(id, body.clone());
    Json(body).into_response()
}

async fn get_endpoint(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    stub.record("GET", format!("endpoints/{}", id), query, Value::Null);
    if !authorized(&headers) {
        return unauthorized();
    }
    if id == "ghost" {
        // unknown ids come back as an empty 200
        return StatusCode::OK.into_response();
    }
    match stub.endpoints.lock().unwrap().get(&id) {
        Some(endpoint) => {
            let mut endpoint = endpoint.clone();
            endpoint["isReady"] = json!(true);
            endpoint["operationStatus"] = json!({"state": "Ready"});
            if let Some(params) = endpoint["authorization"]["parameters"].as_object_mut() {
                for value in params.values_mut() {
                    *value = Value::Null;
                }
            }
            Json(endpoint).into_response()
        }
        None => not_found(&id),
    }
}

async fn list_endpoints(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    stub.record("GET", "endpoints".into(), query.clone(), Value::Null);
    if !authorized(&headers) {
        return unauthorized();
    }
    let name = query.get("endpointNames").cloned().unwrap_or_default();
    let value: Vec<Value> = stub
        .endpoints
        .lock()
        .unwrap()
        .values()
        .filter(|e| e["name"] == json!(name))
        .cloned()
        .collect();
    Json(json!({"count": value.len(), "value": value})).into_response()
}

async fn update_endpoint(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    stub.record("PUT", format!("endpoints/{}", id), query, body.clone());
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut endpoints = stub.endpoints.lock().unwrap();
    if !endpoints.contains_key(&id) {
        return not_found(&id);
    }
    endpoints.insert(id, body.clone());
    Json(body).into_response()
}

async fn delete_endpoint(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    stub.record("DELETE", format!("endpoints/{}", id), query, Value::Null);
    if !authorized(&headers) {
        return unauthorized();
    }
    match stub.endpoints.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(&id),
    }
}

async fn endpoint_proxy(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    stub.record("POST", "endpointproxy".into(), query, body.clone());
    if !authorized(&headers) {
        return unauthorized();
    }
    let result = if body["serviceEndpointDetails"]["url"] == json!(UNREACHABLE_URL) {
        let message = format!(
            "Failed to query service connection API: '{}'. Status Code: 'NotFound'",
            UNREACHABLE_URL
        );
        json!({"statusCode": "BadRequest", "errorMessage": message})
    } else {
        json!({"statusCode": "ok", "errorMessage": "", "result": []})
    };
    Json(result).into_response()
}

async fn list_types(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    stub.record("GET", "types".into(), query, Value::Null);
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "count": 1,
        "value": [{
            "name": "generic",
            "displayName": "Generic",
            "authenticationSchemes": [{
                "scheme": "UsernamePassword",
                "inputDescriptors": [
                    {"id": "username", "name": "Username", "validation": {"isRequired": false}},
                    {"id": "password", "name": "Password", "validation": {"isRequired": false}}
                ]
            }],
            "inputDescriptors": []
        }]
    }))
    .into_response()
}

/// Stub server on an OS-assigned port.
pub struct StubServer {
    pub addr: SocketAddr,
    pub stub: Shared,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl StubServer {
    pub async fn spawn() -> Self {
        let stub: Shared = Arc::new(Stub::default());
        let router = Router::new()
            .route("/org/_apis/serviceendpoint/endpoints", post(create_endpoint))
            .route(
                "/org/_apis/serviceendpoint/endpoints/{id}",
                put(update_endpoint).delete(delete_endpoint),
            )
            .route("/org/_apis/serviceendpoint/types", get(list_types))
            .route("/org/p1/_apis/serviceendpoint/endpoints", get(list_endpoints))
            .route("/org/p1/_apis/serviceendpoint/endpoints/{id}", get(get_endpoint))
            .route("/org/p1/_apis/serviceendpoint/endpointproxy", post(endpoint_proxy))
            .with_state(stub.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            stub,
            shutdown_tx,
        }
    }

    pub fn org_url(&self) -> String {
        format!("http://{}/org", self.addr)
    }

    pub fn client(&self) -> RestClient {
        RestClient::new(&RestConfig::new(self.org_url()).with_token(TOKEN)).unwrap()
    }

    pub fn anonymous_client(&self) -> RestClient {
        RestClient::new(&RestConfig::new(self.org_url())).unwrap()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.stub.requests.lock().unwrap().clone()
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}
