//! Lifecycle reconciler tests against the scripted client.

use std::sync::Arc;
use std::time::Duration;

use epsync_core::testing::ScriptedClient;
use epsync_core::{
    CancellationToken, ClientError, ConnectivityValidator, EndpointAuthorization, EndpointId,
    LifecycleReconciler, OperationState, OperationStatus, ProbeResult, ReconcileError,
    ReconcilerConfig, ScopeId, ScopeReference, ServiceEndpoint,
};

fn generic_draft() -> ServiceEndpoint {
    ServiceEndpoint {
        name: "svc".to_string(),
        endpoint_type: "generic".to_string(),
        url: Some("https://svc.example.com".to_string()),
        authorization: Some(
            EndpointAuthorization::new("UsernamePassword").with_parameter("username", "u"),
        ),
        scope_references: vec![ScopeReference::new(ScopeId::new("p1"), "svc", "")],
        ..Default::default()
    }
}

fn observed(id: &str, is_ready: bool, state: OperationState) -> ServiceEndpoint {
    ServiceEndpoint {
        id: Some(EndpointId::new(id)),
        is_ready: Some(is_ready),
        operation_status: Some(OperationStatus::from_state(state)),
        ..generic_draft()
    }
}

fn setup() -> (Arc<ScriptedClient>, LifecycleReconciler) {
    let client = Arc::new(ScriptedClient::new());
    let lifecycle = LifecycleReconciler::new(client.clone(), ReconcilerConfig::default());
    (client, lifecycle)
}

const TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::test(start_paused = true)]
async fn create_without_scope_references_never_calls_client() {
    let (client, lifecycle) = setup();
    let err = lifecycle
        .create(
            || {
                let mut draft = generic_draft();
                draft.scope_references.clear();
                Ok(draft)
            },
            TIMEOUT,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Validation(_)));
    assert_eq!(client.calls(), Default::default());
}

#[tokio::test(start_paused = true)]
async fn create_waits_until_ready() {
    let (client, lifecycle) = setup();
    client.push_create(Ok(observed("e1", false, OperationState::InProgress)));
    client.push_get(Ok(observed("e1", false, OperationState::InProgress)));
    client.push_get(Ok(ServiceEndpoint {
        operation_status: None,
        ..observed("e1", true, OperationState::InProgress)
    }));

    let ready = lifecycle
        .create(|| Ok(generic_draft()), TIMEOUT, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ready.id, Some(EndpointId::new("e1")));
    assert_eq!(client.calls().create, 1);
    assert_eq!(client.calls().get, 2);
    assert_eq!(client.calls().delete, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_provisioning_rolls_back_once() {
    let (client, lifecycle) = setup();
    client.push_create(Ok(observed("e1", false, OperationState::Pending)));
    client.push_get(Ok(observed("e1", false, OperationState::InProgress)));
    client.push_get(Ok(observed("e1", false, OperationState::Failed)));
    // the rollback itself fails, the caller must still see the readiness error
    client.push_delete(Err(ClientError::Transport("503 Service Unavailable".into())));

    let err = lifecycle
        .create(|| Ok(generic_draft()), TIMEOUT, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_convergence_failure());
    let msg = err.to_string();
    assert!(msg.contains("e1"));
    assert!(msg.contains("p1"));
    assert!(!msg.contains("503"));
    assert_eq!(client.deleted(), vec![(EndpointId::new("e1"), vec![ScopeId::new("p1")])]);
}

#[tokio::test(start_paused = true)]
async fn stuck_provisioning_times_out_and_rolls_back() {
    let (client, lifecycle) = setup();
    client.push_create(Ok(observed("e1", false, OperationState::InProgress)));
    for _ in 0..100 {
        client.push_get(Ok(observed("e1", false, OperationState::InProgress)));
    }

    let err = lifecycle
        .create(|| Ok(generic_draft()), Duration::from_secs(30), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(!err.is_convergence_failure());
    assert!(err.to_string().contains("e1"));
    assert_eq!(client.calls().delete, 1);
}

#[tokio::test(start_paused = true)]
async fn inconclusive_readiness_is_a_timeout() {
    let (client, lifecycle) = setup();
    let inconclusive = ServiceEndpoint {
        is_ready: Some(false),
        operation_status: Some(OperationStatus(serde_json::json!({"state": "Provisioning"}))),
        ..observed("e1", false, OperationState::Pending)
    };
    client.push_create(Ok(inconclusive.clone()));
    for _ in 0..100 {
        client.push_get(Ok(inconclusive.clone()));
    }

    let err = lifecycle
        .create(|| Ok(generic_draft()), Duration::from_secs(30), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(err.to_string().contains("Provisioning"));
}

#[tokio::test(start_paused = true)]
async fn cancelled_create_still_rolls_back() {
    let client = Arc::new(ScriptedClient::new());
    client.push_create(Ok(observed("e1", false, OperationState::InProgress)));
    for _ in 0..100 {
        client.push_get(Ok(observed("e1", false, OperationState::InProgress)));
    }
    let lifecycle = LifecycleReconciler::new(client.clone(), ReconcilerConfig::default());
    let token = CancellationToken::new();
    let handle = token.clone();

    let run = tokio::spawn(async move {
        lifecycle
            .create(|| Ok(generic_draft()), Duration::from_secs(600), &token)
            .await
    });
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.cancel();

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, ReconcileError::Cancelled { .. }));
    assert_eq!(client.calls().delete, 1);
}

#[tokio::test(start_paused = true)]
async fn delete_of_missing_endpoint_succeeds() {
    let (client, lifecycle) = setup();
    let gone = observed("e1", true, OperationState::Ready);

    lifecycle
        .delete(&gone, TIMEOUT, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(client.calls().delete, 1);
    assert_eq!(client.calls().get, 0);
}

#[tokio::test(start_paused = true)]
async fn delete_transport_error_propagates() {
    let (client, lifecycle) = setup();
    client.push_delete(Err(ClientError::Transport("401 Unauthorized".into())));

    let err = lifecycle
        .delete(&observed("e1", true, OperationState::Ready), TIMEOUT, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Transport { .. }));
    assert!(err.to_string().contains("401 Unauthorized"));
}

#[tokio::test(start_paused = true)]
async fn validator_retries_content_failures() {
    let client = Arc::new(ScriptedClient::new());
    client.push_probe(Ok(ProbeResult::failed("BadRequest", "not yet")));
    client.push_probe(Ok(ProbeResult::failed("BadRequest", "still not")));
    client.push_probe(Ok(ProbeResult::ok()));
    let settings = ReconcilerConfig::default().validation;
    let validator = ConnectivityValidator::new(client.clone(), settings);

    validator
        .validate(
            &observed("e1", true, OperationState::Ready),
            &ScopeId::new("p1"),
            Duration::from_secs(60),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(client.calls().execute_probe, 3);
}

#[tokio::test(start_paused = true)]
async fn validator_fails_fast_on_transport_error() {
    let client = Arc::new(ScriptedClient::new());
    client.push_probe(Err(ClientError::Transport("connection refused".into())));
    client.push_probe(Ok(ProbeResult::ok()));
    let settings = ReconcilerConfig::default().validation;
    let validator = ConnectivityValidator::new(client.clone(), settings);

    let err = validator
        .validate(
            &observed("e1", true, OperationState::Ready),
            &ScopeId::new("p1"),
            Duration::from_secs(60),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Transport { .. }));
    assert_eq!(client.calls().execute_probe, 1);
}
