//! RestClient against the stub REST server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::StubServer;
use epsync_core::{
    CancellationToken, ClientError, EndpointAuthorization, EndpointClient, EndpointConfig,
    EndpointId, EndpointResource, LifecycleReconciler, ProbeRequest, ReconcileError,
    ReconcilerConfig, ScopeId, ScopeReference, ServiceEndpoint,
};

fn draft() -> ServiceEndpoint {
    ServiceEndpoint {
        name: "svc".to_string(),
        endpoint_type: "generic".to_string(),
        url: Some("https://svc.example.com".to_string()),
        owner: Some("library".to_string()),
        authorization: Some(
            EndpointAuthorization::new("UsernamePassword")
                .with_parameter("username", "u")
                .with_parameter("password", "p"),
        ),
        scope_references: vec![ScopeReference::new(ScopeId::new("p1"), "svc", "d")],
        ..Default::default()
    }
}

fn fast_config() -> ReconcilerConfig {
    let mut config = ReconcilerConfig::default();
    config.poll.min_interval_ms = 10;
    config.poll.interval_ms = 50;
    config.validation.initial_backoff_ms = 10;
    config.validation.max_backoff_ms = 20;
    config.validation.timeout_secs = 1;
    config
}

#[tokio::test]
async fn create_get_update_delete_round_trip() {
    let server = StubServer::spawn().await;
    let client = server.client();
    let p1 = ScopeId::new("p1");

    let created = client.create(&draft()).await.unwrap();
    let id = created.id.clone().unwrap();
    assert_eq!(created.is_ready, Some(false));

    let fetched = client.get(&id, &p1).await.unwrap();
    assert_eq!(fetched.is_ready, Some(true));
    assert_eq!(fetched.scope_references[0].scope_id, p1);
    // secrets come back as null and are dropped
    assert!(fetched.authorization.as_ref().unwrap().parameters.is_empty());

    let mut changed = fetched.clone();
    changed.description = "new".to_string();
    let updated = client.update(&id, &changed).await.unwrap();
    assert_eq!(updated.description, "new");

    client
        .delete(&id, &[p1.clone(), ScopeId::new("p2")])
        .await
        .unwrap();
    let err = client.get(&id, &p1).await.unwrap_err();
    assert!(err.is_not_found());

    let requests = server.requests();
    assert!(requests.iter().all(|r| r.query.get("api-version").map(String::as_str) == Some("7.1")));
    let delete = requests.iter().find(|r| r.method == "DELETE").unwrap();
    assert_eq!(delete.query["projectIds"], "p1,p2");
    let create = requests.iter().find(|r| r.path == "endpoints" && r.method == "POST").unwrap();
    assert_eq!(create.body["serviceEndpointProjectReferences"][0]["projectReference"]["id"], "p1");
    assert_eq!(create.body["owner"], "library");

    server.shutdown();
}

#[tokio::test]
async fn empty_body_means_not_found() {
    let server = StubServer::spawn().await;
    let err = server
        .client()
        .get(&EndpointId::new("ghost"), &ScopeId::new("p1"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    server.shutdown();
}

#[tokio::test]
async fn http_errors_map_to_client_errors() {
    let server = StubServer::spawn().await;

    let err = server
        .client()
        .update(&EndpointId::new("e42"), &draft())
        .await
        .unwrap_err();
    match err {
        ClientError::NotFound(message) => assert!(message.contains("e42")),
        other => panic!("expected not found, got {other:?}"),
    }

    let err = server.anonymous_client().create(&draft()).await.unwrap_err();
    match err {
        ClientError::Transport(message) => {
            assert!(message.contains("401"));
            assert!(message.contains("TF400813"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }

    server.shutdown();
}

#[tokio::test]
async fn lookup_by_name_and_types() {
    let server = StubServer::spawn().await;
    let client = server.client();
    client.create(&draft()).await.unwrap();

    let found = client.get_by_name(&ScopeId::new("p1"), "svc").await.unwrap();
    assert_eq!(found.len(), 1);
    let none = client.get_by_name(&ScopeId::new("p1"), "other").await.unwrap();
    assert!(none.is_empty());

    let types = client.list_types().await.unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].name, "generic");
    assert_eq!(types[0].authentication_schemes[0].input_descriptors.len(), 2);

    server.shutdown();
}

#[tokio::test]
async fn probe_reports_status() {
    let server = StubServer::spawn().await;
    let client = server.client();

    let mut endpoint = draft();
    endpoint.id = Some(EndpointId::new("e1"));
    let ok = client
        .execute_probe(&ProbeRequest::test_connection(&endpoint, ScopeId::new("p1")))
        .await
        .unwrap();
    assert!(ok.is_ok());

    endpoint.url = Some(common::UNREACHABLE_URL.to_string());
    let failed = client
        .execute_probe(&ProbeRequest::test_connection(&endpoint, ScopeId::new("p1")))
        .await
        .unwrap();
    assert!(!failed.is_ok());
    assert!(failed.error_message.unwrap().contains("Status Code: 'NotFound'"));

    let probe = server
        .requests()
        .into_iter()
        .find(|r| r.path == "endpointproxy")
        .unwrap();
    assert_eq!(probe.query["endpointId"], "e1");
    assert_eq!(probe.body["dataSourceDetails"]["dataSourceName"], "TestConnection");

    server.shutdown();
}

#[tokio::test]
async fn lifecycle_over_rest() {
    let server = StubServer::spawn().await;
    let client = Arc::new(server.client());
    let lifecycle = LifecycleReconciler::new(client, fast_config());

    let ready = lifecycle
        .create(|| Ok(draft()), Duration::from_secs(5), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(ready.is_ready, Some(true));

    lifecycle
        .delete(&ready, Duration::from_secs(5), &CancellationToken::new())
        .await
        .unwrap();
    assert!(server.stub.endpoints.lock().unwrap().is_empty());

    server.shutdown();
}

#[tokio::test]
async fn validated_create_rolls_back_unreachable_endpoint() {
    let server = StubServer::spawn().await;
    let resource = EndpointResource::new(Arc::new(server.client()), fast_config());

    let mut config = EndpointConfig::new(ScopeId::new("p1"), "generic", "svc");
    config.url = Some(common::UNREACHABLE_URL.to_string());
    config.auth_scheme = Some("UsernamePassword".to_string());
    config.authorization.insert("username".into(), "u".into());
    config.features.validate = true;

    let err = resource
        .create(&config, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Connectivity { .. }));
    assert!(err.to_string().contains("unreachable.example.com"));
    assert!(server.stub.endpoints.lock().unwrap().is_empty());

    server.shutdown();
}
