//! Publisher against a real HTTP server on a loopback port.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use bridge::{EventSink, PublishCredentials, PublishError};
use publisher::{sign, CdEventsPublisher, SIGNATURE_HEADER};

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    authorization: String,
    signature: String,
    content_type: String,
    body: Vec<u8>,
}

#[derive(Clone)]
struct Dashboard {
    seen: Arc<Mutex<Vec<Captured>>>,
    status: StatusCode,
    reply: String,
}

async fn receive(
    State(dash): State<Dashboard>,
    uri: axum::http::Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> (StatusCode, String) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    dash.seen.lock().unwrap().push(Captured {
        path: uri.path().to_string(),
        authorization: header("authorization"),
        signature: header("x-webhook-signature"),
        content_type: header("content-type"),
        body: body.to_vec(),
    });
    (dash.status, dash.reply.clone())
}

async fn spawn_dashboard(status: StatusCode, reply: &str) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/webhooks/cdevents", post(receive))
        .with_state(Dashboard {
            seen: seen.clone(),
            status,
            reply: reply.to_string(),
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn credentials(endpoint: &str) -> PublishCredentials {
    PublishCredentials {
        endpoint: endpoint.to_string(),
        auth_token: "tok-123".into(),
        webhook_secret: "shh-secret".into(),
    }
}

#[tokio::test]
async fn posts_signed_body_with_bearer_token() {
    let (endpoint, seen) = spawn_dashboard(StatusCode::ACCEPTED, "").await;
    let publisher = CdEventsPublisher::new(Duration::from_secs(5)).unwrap();
    let body = br#"{"context":{"type":"dev.cdevents.service.deployed.0.3.0"}}"#;

    publisher
        .publish(&credentials(&format!("{endpoint}/")), body)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let request = &seen[0];
    assert_eq!(request.path, "/webhooks/cdevents");
    assert_eq!(request.authorization, "Bearer tok-123");
    assert_eq!(request.content_type, "application/json");
    assert_eq!(request.body, body);
    assert_eq!(request.signature, sign("shh-secret", body).unwrap());
    assert_eq!(SIGNATURE_HEADER.to_ascii_lowercase(), "x-webhook-signature");
}

#[tokio::test]
async fn rejection_reports_status_and_trimmed_body() {
    let (endpoint, _) = spawn_dashboard(StatusCode::UNAUTHORIZED, "  bad token \n").await;
    let publisher = CdEventsPublisher::new(Duration::from_secs(5)).unwrap();

    let err = publisher
        .publish(&credentials(&endpoint), b"{}")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PublishError::Rejected {
            status: 401,
            body: "bad token".into()
        }
    );
}

#[tokio::test]
async fn long_rejection_body_is_truncated() {
    let reply = "x".repeat(2048);
    let (endpoint, _) = spawn_dashboard(StatusCode::INTERNAL_SERVER_ERROR, &reply).await;
    let publisher = CdEventsPublisher::new(Duration::from_secs(5)).unwrap();

    match publisher.publish(&credentials(&endpoint), b"{}").await {
        Err(PublishError::Rejected { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body.len(), publisher::MAX_ERROR_BODY_BYTES);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn blank_credentials_fail_without_network() {
    let publisher = CdEventsPublisher::new(Duration::from_secs(1)).unwrap();
    let mut creds = credentials("http://127.0.0.1:9");
    creds.auth_token = "   ".into();
    assert_eq!(
        publisher.publish(&creds, b"{}").await,
        Err(PublishError::MissingConfiguration)
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let publisher = CdEventsPublisher::new(Duration::from_secs(2)).unwrap();
    let err = publisher
        .publish(&credentials(&format!("http://{addr}")), b"{}")
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn slow_dashboard_hits_the_request_timeout() {
    async fn stall() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(2)).await;
        StatusCode::ACCEPTED
    }
    let app = Router::new().route("/webhooks/cdevents", post(stall));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let publisher = CdEventsPublisher::new(Duration::from_millis(100)).unwrap();
    let started = Instant::now();
    let err = publisher
        .publish(&credentials(&format!("http://{addr}")), b"{}")
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Transport(_)), "{err:?}");
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "gave up after {:?}",
        started.elapsed()
    );
}
