use std::sync::{Arc, Mutex};
use std::time::Duration;

use aura_capture::{
    CapturedRequest, Category, CredentialService, CredentialType, Error, Forwarder,
    HttpCredentialService, SyncStatus,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::DateTime;
use serde_json::{json, Value};

/// Requests received by the fake credential service.
#[derive(Default)]
struct Received {
    parse: Mutex<Vec<Value>>,
    update: Mutex<Vec<Value>>,
}

async fn parse_request(
    State(received): State<Arc<Received>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    received.parse.lock().unwrap().push(body.clone());
    let text = body["request_text"].as_str().unwrap_or_default();
    if !text.contains("aura.token") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No aura.token found in CURL command" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "credentials": {
                "type": body["credential_type"],
                "HEADER_COOKIE_STRING": "sid=1",
            },
        })),
    )
}

async fn update_credentials(
    State(received): State<Arc<Received>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    received.update.lock().unwrap().push(body);
    Json(json!({ "success": true, "message": "saved" }))
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

async fn credential_server() -> (String, Arc<Received>) {
    let received = Arc::new(Received::default());
    let app = Router::new()
        .route("/api/parse-request", post(parse_request))
        .route("/api/update-credentials", post(update_credentials))
        .with_state(received.clone());
    (spawn(app).await, received)
}

fn record(category: Category, body: &str) -> CapturedRequest {
    CapturedRequest {
        category,
        url: "https://portal.example.com/s/sfsites/aura?r=1".to_string(),
        method: "POST".to_string(),
        body: body.to_string(),
        referer: "https://portal.example.com/s/".to_string(),
        user_agent: "Mozilla/5.0".to_string(),
        accept_language: "en".to_string(),
        timestamp: DateTime::from_timestamp_millis(0).unwrap(),
        list_view_id: None,
    }
}

#[tokio::test]
async fn test_parse_then_save() {
    let (base, received) = credential_server().await;
    let service = HttpCredentialService::new(&base).unwrap();
    let forwarder = Forwarder::new(service).unwrap();

    let credentials = forwarder
        .forward(
            &record(Category::PiiDetails, "message=%7B%7D&aura.token=abc"),
            "sid=1",
        )
        .await
        .unwrap();
    assert_eq!(credentials["type"], "PII");

    let parse = received.parse.lock().unwrap();
    assert_eq!(parse.len(), 1);
    assert_eq!(parse[0]["credential_type"], "PII");
    let text = parse[0]["request_text"].as_str().unwrap();
    assert!(text.starts_with("curl 'https://portal.example.com/s/sfsites/aura?r=1'"));
    assert!(text.contains("-H 'Cookie: sid=1'"));

    let update = received.update.lock().unwrap();
    assert_eq!(update.len(), 1);
    assert_eq!(update[0]["credentials"]["HEADER_COOKIE_STRING"], "sid=1");
}

#[tokio::test]
async fn test_failed_parse_skips_save_and_batch_continues() {
    let (base, received) = credential_server().await;
    let forwarder = Forwarder::new(HttpCredentialService::new(&base).unwrap())
        .unwrap()
        .with_pause(Duration::ZERO);

    let history = vec![
        record(Category::WorkOrdersList, "x=1"),
        record(Category::HeaderView, "message=%7B%7D&aura.token=abc"),
    ];
    let report = forwarder.forward_all(&history, "sid=1").await.unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.status_of(Category::HeaderView), Some(&SyncStatus::Synced));
    match report.status_of(Category::WorkOrdersList) {
        Some(SyncStatus::Failed(reason)) => {
            assert!(reason.contains("No aura.token found in CURL command"), "{reason}")
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let types: Vec<Value> = received
        .parse
        .lock()
        .unwrap()
        .iter()
        .map(|b| b["credential_type"].clone())
        .collect();
    assert_eq!(types, vec![json!("HEADER"), json!("FIRST")]);
    assert_eq!(received.update.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failure_reason_falls_back_to_message_then_status() {
    let app = Router::new()
        .route(
            "/api/parse-request",
            post(|| async { Json(json!({ "success": false, "message": "parser offline" })) }),
        )
        .route(
            "/api/update-credentials",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))) }),
        );
    let base = spawn(app).await;
    let service = HttpCredentialService::new(&base).unwrap();

    match service.parse_request("curl", CredentialType::Header).await {
        Err(Error::Service(reason)) => assert_eq!(reason, "parser offline"),
        other => panic!("expected service error, got {other:?}"),
    }
    match service.update_credentials(&Default::default()).await {
        Err(Error::Service(reason)) => assert!(reason.starts_with("HTTP 503"), "{reason}"),
        other => panic!("expected service error, got {other:?}"),
    }
}

#[test]
fn test_server_url_must_parse() {
    assert!(matches!(
        HttpCredentialService::new("localhost without scheme"),
        Err(Error::InvalidServerUrl(_))
    ));
}
