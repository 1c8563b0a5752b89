//! Salesforce adapter tests against a local axum stub of the REST API.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{patch, post};
use axum::{Form, Json, Router};
use common::{CrmApi, DomainError, FieldMap, SalesforceClient, SalesforceConfig, SalesforceObjectApi};
use serde_json::json;

#[derive(Clone)]
struct StubState {
    base_url: String,
    token_requests: Arc<AtomicU32>,
    /// Token the stub rejects with 401
    expired_token: Option<String>,
    /// Decoded ids seen on Contact record routes
    contact_ids: Arc<Mutex<Vec<String>>>,
    account_requests: Arc<AtomicU32>,
}

struct Stub {
    base_url: String,
    token_requests: Arc<AtomicU32>,
    contact_ids: Arc<Mutex<Vec<String>>>,
    account_requests: Arc<AtomicU32>,
}

async fn token(
    State(state): State<StubState>,
    Form(form): Form<std::collections::HashMap<String, String>>,
) -> (StatusCode, Json<serde_json::Value>) {
    if form.get("password").map(String::as_str) != Some("passwordSECTOKEN") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant"})),
        );
    }

    let n = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("token-{n}"),
            "instance_url": state.base_url,
        })),
    )
}

fn authorized(state: &StubState, headers: &HeaderMap) -> bool {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match bearer {
        Some(token) => state.expired_token.as_deref() != Some(token),
        None => false,
    }
}

async fn create_contact(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, String) {
    if !authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, "[]".to_string());
    }
    if body.get("LastName").is_none() {
        return (
            StatusCode::BAD_REQUEST,
            json!([{"errorCode": "REQUIRED_FIELD_MISSING"}]).to_string(),
        );
    }
    (
        StatusCode::CREATED,
        json!({"id": "003000000000001", "success": true}).to_string(),
    )
}

async fn update_contact(
    State(state): State<StubState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> StatusCode {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED;
    }
    state.contact_ids.lock().unwrap().push(id.clone());
    if id == "missing" {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn account_request(State(state): State<StubState>) -> StatusCode {
    state.account_requests.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn start_stub(expired_token: Option<&str>) -> Stub {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let token_requests = Arc::new(AtomicU32::new(0));
    let contact_ids = Arc::new(Mutex::new(Vec::new()));
    let account_requests = Arc::new(AtomicU32::new(0));

    let state = StubState {
        base_url: base_url.clone(),
        token_requests: token_requests.clone(),
        expired_token: expired_token.map(str::to_string),
        contact_ids: contact_ids.clone(),
        account_requests: account_requests.clone(),
    };

    let app = Router::new()
        .route("/services/oauth2/token", post(token))
        .route("/services/data/v60.0/sobjects/Contact", post(create_contact))
        .route(
            "/services/data/v60.0/sobjects/Contact/:id",
            patch(update_contact)
                .delete(update_contact)
                .get(|| async { (StatusCode::OK, "{}") }),
        )
        .route(
            "/services/data/v60.0/sobjects/Account/*rest",
            patch(account_request).delete(account_request),
        )
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Stub {
        base_url,
        token_requests,
        contact_ids,
        account_requests,
    }
}

fn config(login_url: &str) -> SalesforceConfig {
    SalesforceConfig {
        login_url: login_url.to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        username: "integration@example.com".to_string(),
        password: "password".to_string(),
        security_token: "SECTOKEN".to_string(),
        ..Default::default()
    }
}

fn contacts(login_url: &str) -> SalesforceObjectApi {
    let client = SalesforceClient::new(config(login_url)).unwrap();
    SalesforceObjectApi::new(Arc::new(client), "Contact")
}

fn fields(value: serde_json::Value) -> FieldMap {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn create_returns_status_and_body() {
    let stub = start_stub(None).await;
    let api = contacts(&stub.base_url);

    let response = api
        .create(&fields(json!({"FirstName": "Zero", "LastName": "Cool"})))
        .await
        .unwrap();
    assert_eq!(response.status, 201);
    assert!(response.body.contains("003000000000001"));

    let response = api.create(&fields(json!({"FirstName": "Zero"}))).await.unwrap();
    assert_eq!(response.status, 400);
    assert!(response.body.contains("REQUIRED_FIELD_MISSING"));

    // Token acquired once and reused
    assert_eq!(stub.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn update_delete_and_get_use_record_path() {
    let stub = start_stub(None).await;
    let api = contacts(&stub.base_url);

    let body = fields(json!({"Email": "zero@example.com"}));
    assert_eq!(api.update("003ABC", &body).await.unwrap().status, 204);
    assert_eq!(api.update("missing", &body).await.unwrap().status, 404);
    assert_eq!(api.delete("003ABC").await.unwrap().status, 204);
    assert_eq!(api.get("003ABC").await.unwrap().status, 200);
}

#[tokio::test]
async fn id_with_path_characters_stays_on_the_record_route() {
    let stub = start_stub(None).await;
    let api = contacts(&stub.base_url);

    let hostile = "003X/../../Account/001EVIL";
    let body = fields(json!({"Email": "zero@example.com"}));
    assert_eq!(api.update(hostile, &body).await.unwrap().status, 204);
    assert_eq!(api.delete(hostile).await.unwrap().status, 204);

    assert_eq!(stub.account_requests.load(Ordering::SeqCst), 0);
    assert_eq!(
        *stub.contact_ids.lock().unwrap(),
        vec![hostile.to_string(), hostile.to_string()]
    );
}

#[tokio::test]
async fn unauthorized_triggers_single_reauthentication() {
    let stub = start_stub(Some("token-1")).await;
    let api = contacts(&stub.base_url);

    let response = api
        .update("003ABC", &fields(json!({"Email": "zero@example.com"})))
        .await
        .unwrap();

    assert_eq!(response.status, 204);
    assert_eq!(stub.token_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejected_credentials_are_authentication_errors() {
    let stub = start_stub(None).await;
    let mut cfg = config(&stub.base_url);
    cfg.security_token = "WRONG".to_string();
    let api = SalesforceObjectApi::new(Arc::new(SalesforceClient::new(cfg).unwrap()), "Contact");

    let result = api.delete("003ABC").await;
    assert!(matches!(result, Err(DomainError::CrmAuthentication(_))));
}

#[tokio::test]
async fn unreachable_crm_is_a_transport_error() {
    // Token endpoint reachable, instance_url points at a closed port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let app = Router::new().route(
        "/services/oauth2/token",
        post(move || {
            let closed = closed.clone();
            async move { Json(json!({"access_token": "t", "instance_url": closed})) }
        }),
    );
    let login = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let login_url = format!("http://{}", login.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(login, app).await.unwrap();
    });

    let result = contacts(&login_url).get("003ABC").await;
    assert!(matches!(result, Err(DomainError::CrmTransport(_))));
}
