//! Mastermind role API over HTTP.

use std::sync::Arc;
use std::time::Duration;

use mastermind_access::{
    AccessConfig, AccessError, ApiKey, ApprovalApi, ApprovalPoller, ApprovalResponse, Backoff,
    MastermindClient, RetryPolicy,
};
use mastermind_types::{Permissions, Principal, ProjectIdentifier, RoleRequest};
use serde_json::json;
use wiremock::matchers::{basic_auth, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/mastermind/buildkite-widgets";

fn role_request() -> RoleRequest {
    RoleRequest {
        project_identifier: ProjectIdentifier::for_pipeline("widgets"),
        environment: "build".into(),
        principal: Principal::aws("arn:aws:iam::123456789012:role/buildkite-agent"),
        permissions: Permissions { resources: vec![] },
    }
}

fn client(server: &MockServer) -> MastermindClient {
    MastermindClient::new(
        &server.uri(),
        "buildkite",
        ApiKey::new("s3cret"),
        &AccessConfig::default(),
    )
    .unwrap()
}

fn poller(server: &MockServer) -> ApprovalPoller {
    ApprovalPoller::new(
        Arc::new(client(server)),
        RetryPolicy::deadline(Duration::from_secs(10), Backoff::None),
        RetryPolicy::attempts(3, Backoff::None),
    )
}

fn approved() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "arn": ROLE_ARN, "ttl": 3600 }))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submits_authenticated_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/role"))
        .and(basic_auth("buildkite", "s3cret"))
        .and(body_json(json!({
            "project_identifier": "buildkite:widgets",
            "environment": "build",
            "principal": {
                "type": "AWS",
                "value": "arn:aws:iam::123456789012:role/buildkite-agent"
            },
            "permissions": { "resources": [] }
        })))
        .respond_with(approved())
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).submit(&role_request()).await.unwrap();

    match response {
        ApprovalResponse::Approved(grant) => {
            assert_eq!(grant.arn, ROLE_ARN);
            assert_eq!(grant.extra.get("ttl"), Some(&json!(3600)));
        }
        other => panic!("expected approval, got {:?}", other),
    }
}

#[tokio::test]
async fn accepted_means_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/role"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let response = client(&server).submit(&role_request()).await.unwrap();

    assert_eq!(response, ApprovalResponse::Pending);
}

#[tokio::test]
async fn rejection_carries_response_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/role"))
        .respond_with(ResponseTemplate::new(403).set_body_string("project not registered"))
        .mount(&server)
        .await;

    let err = client(&server).submit(&role_request()).await.unwrap_err();

    match err {
        AccessError::Http { status, body, .. } => {
            assert_eq!(status, 403);
            assert_eq!(body, "project not registered");
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_resubmitted_until_approved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/role"))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/role"))
        .respond_with(approved())
        .expect(1)
        .mount(&server)
        .await;

    let grant = poller(&server).request_access(&role_request()).await.unwrap();

    assert_eq!(grant.arn, ROLE_ARN);
}

#[tokio::test]
async fn server_error_retried_within_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/role"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/role"))
        .respond_with(approved())
        .expect(1)
        .mount(&server)
        .await;

    let grant = poller(&server).request_access(&role_request()).await.unwrap();

    assert_eq!(grant.arn, ROLE_ARN);
}

#[tokio::test]
async fn rejection_stops_polling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/role"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid principal"))
        .expect(1)
        .mount(&server)
        .await;

    let err = poller(&server).request_access(&role_request()).await.unwrap_err();

    assert_eq!(err.status(), Some(400));
}
