//! Router-level tests: the full register -> login -> consent flow over HTTP,
//! prompt preconditions, and the transport guards.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;

use facegate::biometric::{
    BiometricVerifier, DeviceIdentity, MatchDecision, MatchPolicy, ProviderRequest, SecurityChecks,
    TransportError,
};
use facegate::identity::MemoryAccountStore;
use facegate::interaction::{MemorySessionEngine, PendingInteraction, Prompt, PromptKind, RequestParams};
use facegate::server::{router, AppState};

const ISSUER: &str = "http://op.test";

/// Matches only references it has enrolled, plus any seeded up front.
#[derive(Default)]
struct StubProvider {
    known: Mutex<HashSet<String>>,
}

impl StubProvider {
    fn seeded(refs: &[&str]) -> Arc<Self> {
        Arc::new(Self { known: Mutex::new(refs.iter().map(|r| r.to_string()).collect()) })
    }
}

fn perfect(success: bool) -> MatchDecision {
    MatchDecision {
        success,
        was_processed: true,
        error: false,
        match_level: if success { 10 } else { 0 },
        face_scan_security_checks: SecurityChecks {
            audit_trail_verification_check_succeeded: true,
            face_scan_liveness_check_succeeded: true,
            replay_check_succeeded: true,
            session_token_check_succeeded: true,
        },
        ..Default::default()
    }
}

#[async_trait]
impl BiometricVerifier for StubProvider {
    async fn match_capture(
        &self,
        r: &ProviderRequest,
        _d: &DeviceIdentity,
    ) -> Result<MatchDecision, TransportError> {
        Ok(perfect(self.known.lock().contains(&r.external_database_ref_id)))
    }

    async fn enroll_capture(
        &self,
        r: &ProviderRequest,
        _d: &DeviceIdentity,
    ) -> Result<MatchDecision, TransportError> {
        self.known.lock().insert(r.external_database_ref_id.clone());
        Ok(perfect(true))
    }
}

fn app_with(production: bool) -> (Router, Arc<MemorySessionEngine>) {
    app_with_provider(production, Arc::new(StubProvider::default()))
}

fn app_with_provider(production: bool, provider: Arc<StubProvider>) -> (Router, Arc<MemorySessionEngine>) {
    let engine = Arc::new(MemorySessionEngine::new(ISSUER, Duration::from_secs(600)));
    let state = AppState::new(
        Arc::new(MemoryAccountStore::new()),
        provider,
        engine.clone(),
        MatchPolicy::default(),
        Duration::from_secs(2),
    );
    (router(state, production), engine)
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn body_text(res: Response) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(res: Response) -> Value {
    serde_json::from_str(&body_text(res).await).unwrap()
}

fn location(res: &Response) -> String {
    res.headers()[header::LOCATION].to_str().unwrap().to_string()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_form(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
}

async fn register(app: &Router, username: &str, password: &str) {
    let res = send(app, post_json("/users", json!({"username": username, "password": password}))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, "User successfully created.");
}

async fn begin(app: &Router, scope: &str) -> String {
    let res = send(app, get(&format!("/auth?client_id=app&scope={}", scope.replace(' ', "%20")))).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let loc = location(&res);
    loc.strip_prefix("/interaction/").unwrap().to_string()
}

#[tokio::test]
async fn password_login_then_consent_completes() {
    let (app, _engine) = app_with(false);
    register(&app, "alice", "p1").await;
    let uid = begin(&app, "openid profile").await;

    let res = send(&app, get(&format!("/interaction/{uid}"))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::PRAGMA], "no-cache");
    assert_eq!(res.headers()[header::CACHE_CONTROL], "no-cache, no-store");
    let view = body_json(res).await;
    assert_eq!(view["prompt"], "login");
    assert_eq!(view["title"], "Sign-In");

    let res = send(&app, post_form(&format!("/interaction/{uid}/login"), "username=alice&password=p1")).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), format!("{ISSUER}/auth/{uid}"));

    let res = send(&app, get(&format!("/auth/{uid}"))).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), format!("/interaction/{uid}"));

    let view = body_json(send(&app, get(&format!("/interaction/{uid}"))).await).await;
    assert_eq!(view["prompt"], "consent");
    assert_eq!(view["title"], "Authorize");
    assert_eq!(view["clientId"], "app");
    assert_eq!(view["scope"], "openid, profile");

    // A second login on the consent prompt changes nothing.
    let res = send(&app, post_form(&format!("/interaction/{uid}/login"), "username=alice&password=p1")).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), format!("/interaction/{uid}"));

    let res = send(&app, post_empty(&format!("/interaction/{uid}/confirm"))).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), format!("{ISSUER}/auth/{uid}"));

    let record = body_json(send(&app, get(&format!("/auth/{uid}"))).await).await;
    assert!(record["result"]["consent"]["grantId"].is_string());
    assert_eq!(record["options"]["mergeWithLastSubmission"], true);
    assert_eq!(record["submission"]["login"]["accountId"], "alice");

    let res = send(&app, get(&format!("/interaction/{uid}"))).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(res).await, "interaction not found");
}

#[tokio::test]
async fn wrong_password_finalizes_access_denied() {
    let (app, engine) = app_with(false);
    register(&app, "alice", "p1").await;
    let uid = begin(&app, "openid").await;

    let res = send(&app, post_form(&format!("/interaction/{uid}/login"), "username=alice&password=nope")).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let record = engine.last_finalization(&uid).unwrap();
    let wire = serde_json::to_value(&record.result).unwrap();
    assert_eq!(
        wire,
        json!({"error": "access_denied", "error_description": "Username or password is incorrect."})
    );
}

#[tokio::test]
async fn confirm_on_login_prompt_is_rejected() {
    let (app, engine) = app_with(false);
    let uid = begin(&app, "openid").await;

    let res = send(&app, post_empty(&format!("/interaction/{uid}/confirm"))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()[header::PRAGMA], "no-cache");
    assert_eq!(body_text(res).await, "Interaction prompt type must be `consent`.");
    assert!(engine.last_finalization(&uid).is_none());
}

#[tokio::test]
async fn abort_redirects_with_denial() {
    let (app, engine) = app_with(false);
    let uid = begin(&app, "openid").await;

    let res = send(&app, get(&format!("/interaction/{uid}/abort"))).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let record = engine.last_finalization(&uid).unwrap();
    assert_eq!(
        serde_json::to_value(&record.result).unwrap(),
        json!({"error": "access_denied", "error_description": "End-User aborted interaction"})
    );
}

#[tokio::test]
async fn unsupported_prompt_is_not_implemented() {
    let (app, engine) = app_with(false);
    engine.insert(PendingInteraction {
        uid: "sel-1".into(),
        prompt: Prompt { name: PromptKind::from("select_account".to_string()), details: json!({}) },
        params: RequestParams { client_id: "app".into(), scope: "openid".into(), ..Default::default() },
        session: None,
        grant_id: None,
        expires_at: chrono::Utc::now() + chrono::Duration::minutes(5),
    });
    let res = send(&app, get("/interaction/sel-1")).await;
    assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body_text(res).await, "Not implemented.");
}

#[tokio::test]
async fn unknown_uid_is_not_found() {
    let (app, _) = app_with(false);
    let requests = [
        get("/interaction/missing"),
        get("/interaction/missing/abort"),
        post_empty("/interaction/missing/confirm"),
    ];
    for req in requests {
        assert_eq!(send(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn register_requires_both_fields() {
    let (app, _) = app_with(false);
    let res = send(&app, post_json("/users", json!({"username": "alice"}))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

fn verify_request(uid: &str, body: Value, with_headers: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/interaction/{uid}/verify"))
        .header(header::CONTENT_TYPE, "application/json");
    if with_headers {
        builder = builder.header("X-Device-Key", "device-1").header("X-User-Agent", "sdk-ua");
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn enroll_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/users/{username}/enrollment"))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Device-Key", "device-1")
        .header("X-User-Agent", "sdk-ua")
        .body(Body::from(json!({"password": password, "faceScan": "ZmFjZQ=="}).to_string()))
        .unwrap()
}

fn face_denied() -> Value {
    json!({"error": "access_denied", "error_description": "Face verification failed."})
}

#[tokio::test]
async fn enrolled_face_logs_in_with_returned_username() {
    let (app, engine) = app_with(false);
    register(&app, "alice", "p1").await;
    let receipt = body_json(send(&app, enroll_request("alice", "p1")).await).await;
    assert_eq!(receipt["username"], "alice");
    let uid = begin(&app, "openid").await;

    let body = json!({"faceScan": "ZmFjZQ==", "username": receipt["username"]});
    let res = send(&app, verify_request(&uid, body.clone(), false)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = send(&app, verify_request(&uid, body, true)).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let record = engine.last_finalization(&uid).unwrap();
    assert_eq!(serde_json::to_value(&record.result).unwrap(), json!({"login": {"accountId": "alice"}}));
}

#[tokio::test]
async fn unenrolled_account_cannot_face_login() {
    // The provider already holds a face under the bare username.
    let (app, engine) = app_with_provider(false, StubProvider::seeded(&["alice"]));
    register(&app, "alice", "p1").await;
    let uid = begin(&app, "openid").await;

    let body = json!({"faceScan": "ZmFjZQ==", "username": "alice"});
    let res = send(&app, verify_request(&uid, body, true)).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let record = engine.last_finalization(&uid).unwrap();
    assert_eq!(serde_json::to_value(&record.result).unwrap(), face_denied());
}

#[tokio::test]
async fn face_login_without_claim_is_denied() {
    let (app, engine) = app_with(false);
    register(&app, "alice", "p1").await;
    send(&app, enroll_request("alice", "p1")).await;
    let uid = begin(&app, "openid").await;

    let res = send(&app, verify_request(&uid, json!({"faceScan": "ZmFjZQ=="}), true)).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let record = engine.last_finalization(&uid).unwrap();
    assert_eq!(serde_json::to_value(&record.result).unwrap(), face_denied());
}

#[tokio::test]
async fn enrollment_reference_is_stable() {
    let (app, _) = app_with(false);
    register(&app, "alice", "p1").await;

    let res = send(&app, enroll_request("alice", "wrong")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let first = body_json(send(&app, enroll_request("alice", "p1")).await).await;
    assert_eq!(first["username"], "alice");
    let reference = first["biometricReferenceId"].as_str().unwrap().to_string();
    assert_ne!(reference, "alice");
    let second = body_json(send(&app, enroll_request("alice", "p1")).await).await;
    assert_eq!(second["biometricReferenceId"], reference);
}

#[tokio::test]
async fn production_mode_requires_https() {
    let (app, _) = app_with(true);

    let plain = Request::builder().uri("/").header(header::HOST, "op.test").body(Body::empty()).unwrap();
    let res = send(&app, plain).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "https://op.test/");

    let res = send(&app, post_json("/users", json!({"username": "a", "password": "b"}))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(res).await,
        json!({"error": "invalid_request", "error_description": "do yourself a favor and only use https"})
    );

    let res = send(
        &app,
        Request::builder().uri("/").header("x-forwarded-proto", "https").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, "facegate ok");
}
