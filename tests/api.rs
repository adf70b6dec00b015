use std::sync::Arc;

use accounts::{
    app::build_app,
    auth::jwt::JwtKeys,
    config::{AppConfig, HashingConfig, JwtConfig},
    state::AppState,
    users::memory::InMemoryUserRepository,
};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use jsonwebtoken::Algorithm;
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret";

fn config() -> AppConfig {
    AppConfig {
        database_url: None,
        jwt: JwtConfig {
            secret: SECRET.into(),
            algorithm: Algorithm::HS256,
            ttl_minutes: 15,
        },
        hashing: HashingConfig {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        },
        request_timeout_secs: 10,
    }
}

fn build() -> (Router, JwtKeys) {
    let config = Arc::new(config());
    let keys = JwtKeys::new(&config.jwt).expect("keys");
    let state = AppState::from_parts(config, Arc::new(InMemoryUserRepository::new()))
        .expect("state");
    (build_app(state), keys)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, t);
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create(app: &Router, username: &str, email: &str, password: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/user",
        None,
        Some(json!({ "username": username, "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().expect("id")
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await
}

async fn token(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = login(app, email, password).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().expect("token").to_owned()
}

fn tamper_signature(token: &str) -> String {
    let (rest, sig) = token.rsplit_once('.').unwrap();
    let mut sig = sig.to_owned();
    let first = if sig.starts_with('A') { "B" } else { "A" };
    sig.replace_range(0..1, first);
    format!("{rest}.{sig}")
}

#[tokio::test]
async fn health_is_public() {
    let (app, _) = build();
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_login_and_read_own_account() {
    let (app, _) = build();
    let ana = create(&app, "ana", "ana@example.com", "p@ss1234").await;
    let t = token(&app, "ana@example.com", "p@ss1234").await;

    let (status, body) = send(&app, Method::GET, &format!("/user/{ana}"), Some(&t), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ana");
    assert_eq!(body["email"], "ana@example.com");
    assert!(body.get("password_hash").is_none());

    // Scheme prefix is accepted too.
    let bearer = format!("Bearer {t}");
    let (status, _) = send(&app, Method::GET, &format!("/user/{ana}"), Some(&bearer), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn token_for_other_account_is_forbidden() {
    let (app, _) = build();
    let ana = create(&app, "ana", "ana@example.com", "p@ss1234").await;
    create(&app, "bob", "bob@example.com", "hunter22!").await;
    let bob_token = token(&app, "bob@example.com", "hunter22!").await;

    let (status, body) =
        send(&app, Method::GET, &format!("/user/{ana}"), Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "forbidden" }));

    let (status, _) =
        send(&app, Method::DELETE, &format!("/user/{ana}"), Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn expired_and_tampered_tokens_are_unauthenticated() {
    let (app, keys) = build();
    let ana = create(&app, "ana", "ana@example.com", "p@ss1234").await;
    let uri = format!("/user/{ana}");

    let expired = keys
        .issue_at(
            "ana",
            "ana@example.com",
            OffsetDateTime::now_utc() - Duration::hours(1),
        )
        .unwrap()
        .token;
    let (status, body) = send(&app, Method::GET, &uri, Some(&expired), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "unauthenticated" }));

    let good = token(&app, "ana@example.com", "p@ss1234").await;
    let (status, body) = send(&app, Method::GET, &uri, Some(&tamper_signature(&good)), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "unauthenticated" }));

    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn algorithm_substitution_is_unauthenticated() {
    let (app, _) = build();
    let ana = create(&app, "ana", "ana@example.com", "p@ss1234").await;
    let hs512 = JwtKeys::new(&JwtConfig {
        secret: SECRET.into(),
        algorithm: Algorithm::HS512,
        ttl_minutes: 15,
    })
    .unwrap();
    let forged = hs512.issue("ana", "ana@example.com").unwrap().token;

    let (status, _) = send(&app, Method::GET, &format!("/user/{ana}"), Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_failures_share_one_shape() {
    let (app, _) = build();
    create(&app, "ana", "ana@example.com", "p@ss1234").await;

    let wrong_password = login(&app, "ana@example.com", "wrong-password").await;
    let unknown_email = login(&app, "nobody@example.com", "p@ss1234").await;
    assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password.1, json!({ "error": "invalid credentials" }));
}

#[tokio::test]
async fn malformed_id_is_bad_request_only_when_authenticated() {
    let (app, _) = build();
    create(&app, "ana", "ana@example.com", "p@ss1234").await;
    let t = token(&app, "ana@example.com", "p@ss1234").await;

    let (status, _) = send(&app, Method::GET, "/user/not-a-number", Some(&t), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/user/not-a-number", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_account_id_is_unauthenticated() {
    let (app, _) = build();
    create(&app, "ana", "ana@example.com", "p@ss1234").await;
    let t = token(&app, "ana@example.com", "p@ss1234").await;

    let (status, _) = send(&app, Method::GET, "/user/9999", Some(&t), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let (app, _) = build();
    create(&app, "ana", "ana@example.com", "p@ss1234").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/user",
        None,
        Some(json!({ "username": "ana", "email": "other@example.com", "password": "p@ss1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/user",
        None,
        Some(json!({ "username": "ana2", "email": "ANA@example.com", "password": "p@ss1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn list_requires_a_verified_token() {
    let (app, _) = build();
    create(&app, "ana", "ana@example.com", "p@ss1234").await;
    create(&app, "bob", "bob@example.com", "hunter22!").await;

    let (status, _) = send(&app, Method::GET, "/user", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let t = token(&app, "ana@example.com", "p@ss1234").await;
    let (status, body) = send(&app, Method::GET, "/user", Some(&t), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["ana", "bob"]);
}

#[tokio::test]
async fn update_password_then_login_with_new_one() {
    let (app, _) = build();
    let ana = create(&app, "ana", "ana@example.com", "p@ss1234").await;
    let t = token(&app, "ana@example.com", "p@ss1234").await;

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/user/{ana}"),
        Some(&t),
        Some(json!({ "password": "n3w-p@ssword" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["username"], "ana");

    let (status, _) = login(&app, "ana@example.com", "p@ss1234").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    token(&app, "ana@example.com", "n3w-p@ssword").await;
}

#[tokio::test]
async fn username_cannot_be_updated() {
    let (app, _) = build();
    let ana = create(&app, "ana", "ana@example.com", "p@ss1234").await;
    let t = token(&app, "ana@example.com", "p@ss1234").await;

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/user/{ana}"),
        Some(&t),
        Some(json!({ "username": "mallory" })),
    )
    .await;
    assert!(status.is_client_error());
    let (_, body) = send(&app, Method::GET, &format!("/user/{ana}"), Some(&t), None).await;
    assert_eq!(body["username"], "ana");
}

#[tokio::test]
async fn delete_own_account() {
    let (app, _) = build();
    let ana = create(&app, "ana", "ana@example.com", "p@ss1234").await;
    let t = token(&app, "ana@example.com", "p@ss1234").await;
    let uri = format!("/user/{ana}");

    let (status, body) = send(&app, Method::DELETE, &uri, Some(&t), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "deleted": ana }));

    // The token outlives the account, but no longer opens anything.
    let (status, _) = send(&app, Method::GET, &uri, Some(&t), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&app, "ana@example.com", "p@ss1234").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
