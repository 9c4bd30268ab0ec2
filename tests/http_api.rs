use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tollgate::api;
use tollgate::application_impl::TokenLifetimes;
use tollgate::infra_memory::ManualClock;
use tollgate::server::*;
use warp::Filter;
use warp::http::StatusCode;
use warp::test::RequestBuilder;

fn server() -> Arc<Server> {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2031, 3, 14, 9, 0, 0).unwrap(),
    ));
    let config = ServerConfig {
        lifetimes: TokenLifetimes::default(),
        reaper_interval: Duration::from_secs(3600),
        request_timeout: Duration::from_secs(5),
    };
    Arc::new(Server::with_backends(Backends::memory(clock), config))
}

async fn call(server: &Arc<Server>, request: RequestBuilder) -> (StatusCode, Value) {
    let api_v1 = warp::path("api")
        .and(warp::path("v1"))
        .and(api::v1::routes(server.clone()))
        .recover(api::v1::recover_error);
    let response = request.reply(&api_v1).await;
    let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
    (response.status(), body)
}

fn post(path: &str, body: Value) -> RequestBuilder {
    warp::test::request()
        .method("POST")
        .path(path)
        .header("x-forwarded-for", "203.0.113.50")
        .json(&body)
}

fn with_bearer(request: RequestBuilder, token: &str) -> RequestBuilder {
    request.header("authorization", format!("Bearer {token}"))
}

async fn register(server: &Arc<Server>, email: &str, ip: &str) -> Value {
    let (status, body) = call(
        server,
        post("/api/v1/auth/register", json!({ "name": "svc", "email": email }))
            .header("x-forwarded-for", ip),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

async fn login(server: &Arc<Server>, client: &Value) -> Value {
    let (status, body) = call(
        server,
        post(
            "/api/v1/auth/login",
            json!({ "client_id": client["client_id"], "secret": client["secret"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"].clone()
}

#[tokio::test]
async fn health_is_ok_on_memory_backends() {
    let server = server();
    let (status, body) = call(&server, warp::test::request().path("/api/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "store": true, "cache": true }));
}

#[tokio::test]
async fn full_session_lifecycle() {
    let server = server();
    let client = register(&server, "ops@example.com", "198.51.100.1").await;
    let tokens = login(&server, &client).await;
    let access = tokens["access_token"].as_str().unwrap();

    let (status, body) = call(
        &server,
        with_bearer(warp::test::request().path("/api/v1/auth/me"), access),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["client_id"], client["client_id"]);

    let (status, body) = call(
        &server,
        with_bearer(warp::test::request().path("/api/v1/auth/sessions"), access),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["current"], json!(true));
    assert_eq!(body["data"][0]["ip_address"], json!("203.0.113.50"));

    let (status, _) = call(
        &server,
        with_bearer(
            warp::test::request().method("POST").path("/api/v1/auth/logout"),
            access,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &server,
        with_bearer(warp::test::request().path("/api/v1/auth/me"), access),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("token_revoked"));

    let (status, body) = call(
        &server,
        post(
            "/api/v1/auth/refresh",
            json!({ "refresh_token": tokens["refresh_token"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["access_token"], tokens["access_token"]);
}

#[tokio::test]
async fn missing_or_malformed_bearer_is_unauthorized() {
    let server = server();

    let (status, body) = call(&server, warp::test::request().path("/api/v1/auth/me")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("invalid_token"));

    let (status, _) = call(
        &server,
        warp::test::request()
            .path("/api/v1/auth/me")
            .header("authorization", "Basic Zm9vOmJhcg=="),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_is_rate_limited_per_address() {
    let server = server();
    let bad = json!({ "client_id": "nobody", "secret": "guess" });

    for _ in 0..5 {
        let (status, _) = call(&server, post("/api/v1/auth/login", bad.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = call(&server, post("/api/v1/auth/login", bad.clone())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body["error"]["code"],
        json!({ "rate_limited": { "max": 5, "window_secs": 900 } })
    );

    let (status, _) = call(
        &server,
        post("/api/v1/auth/login", bad).header("x-forwarded-for", "203.0.113.99"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleting_another_clients_session_is_forbidden() {
    let server = server();
    let alice = register(&server, "alice@example.com", "198.51.100.1").await;
    let bob = register(&server, "bob@example.com", "198.51.100.2").await;
    let alice_access = login(&server, &alice).await["access_token"]
        .as_str()
        .unwrap()
        .to_string();
    let bob_access = login(&server, &bob).await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = call(
        &server,
        with_bearer(
            warp::test::request()
                .method("DELETE")
                .path(&format!("/api/v1/auth/sessions/{alice_access}")),
            &bob_access,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("forbidden"));

    let (status, _) = call(
        &server,
        with_bearer(
            warp::test::request()
                .method("DELETE")
                .path(&format!("/api/v1/auth/sessions/{alice_access}")),
            &alice_access,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn register_validates_input() {
    let server = server();

    let (status, body) = call(
        &server,
        post("/api/v1/auth/register", json!({ "name": "", "email": "a@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["code"].get("invalid_request").is_some());

    let (status, _) = call(
        &server,
        post("/api/v1/auth/register", json!({ "name": "svc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let server = server();
    register(&server, "ops@example.com", "198.51.100.1").await;

    let (status, body) = call(
        &server,
        post(
            "/api/v1/auth/register",
            json!({ "name": "svc", "email": "ops@example.com" }),
        )
        .header("x-forwarded-for", "198.51.100.7"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], json!("client_exists"));
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let server = server();
    let (status, body) = call(&server, warp::test::request().path("/api/v1/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));
}
