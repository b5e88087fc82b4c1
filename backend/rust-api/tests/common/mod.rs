#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use mathquiz_api::{config::Config, create_router, services::quiz_service::QuizService, AppState};
use mongodb::{bson::doc, options::ClientOptions, Database};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

/// Builds the router against the MongoDB and Redis named in `.env.test`.
/// Returns `None` (and the calling test passes without running) when either
/// service is unreachable.
pub async fn create_test_app() -> Option<Router> {
    create_test_app_with_db().await.map(|(app, _)| app)
}

/// Same as [`create_test_app`], also handing back the database so a test can
/// seed documents directly.
pub async fn create_test_app_with_db() -> Option<(Router, Database)> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    dotenvy::from_filename(".env.test").ok();
    // Tests register many users from the same "unknown" client address.
    std::env::set_var("RATE_LIMIT_DISABLED", "1");

    let config = Config::load().expect("Failed to load test configuration");

    let Some(mongo_client) = reachable_mongo(&config.mongo_uri).await else {
        eprintln!("MongoDB unreachable at {}, skipping", config.mongo_uri);
        return None;
    };

    let redis_client =
        redis::Client::open(config.redis_uri.clone()).expect("Failed to create test Redis client");
    let redis_up = tokio::time::timeout(
        SERVICE_PROBE_TIMEOUT,
        redis_client.get_multiplexed_async_connection(),
    )
    .await
    .map(|conn| conn.is_ok())
    .unwrap_or(false);
    if !redis_up {
        eprintln!("Redis unreachable at {}, skipping", config.redis_uri);
        return None;
    }

    let app_state = Arc::new(
        AppState::new(config, mongo_client, redis_client)
            .await
            .expect("Failed to initialize test app state"),
    );

    QuizService::new(app_state.mongo.clone(), app_state.redis.clone())
        .ensure_indexes()
        .await
        .expect("Failed to create indexes");

    let mongo = app_state.mongo.clone();
    Some((create_router(app_state), mongo))
}

const SERVICE_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

async fn reachable_mongo(uri: &str) -> Option<mongodb::Client> {
    let mut options = ClientOptions::parse(uri)
        .await
        .expect("Invalid test MongoDB URI");
    options.server_selection_timeout = Some(SERVICE_PROBE_TIMEOUT);

    let client = mongodb::Client::with_options(options).expect("Failed to build MongoDB client");
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .ok()
        .map(|_| client)
}

/// Short unique suffix so parallel tests never collide on username/email.
pub fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..12])
}

pub struct Response {
    pub status: StatusCode,
    pub cookies: Vec<String>,
    pub body: Value,
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let cookies = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
        .collect();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    Response {
        status,
        cookies,
        body,
    }
}

pub async fn register(app: &Router, username: &str, password: &str) -> Response {
    send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Test Player",
            "username": username,
            "email": format!("{}@example.com", username),
            "password": password,
        })),
    )
    .await
}

/// Registers a fresh user and logs in. Returns `(user_id, token)`.
pub async fn signed_in_user(app: &Router) -> (String, String) {
    let username = unique("player");
    let registered = register(app, &username, "secret123").await;
    assert_eq!(registered.status, StatusCode::CREATED, "{}", registered.body);

    let login = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "emailOrUsername": username, "password": "secret123" })),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK, "{}", login.body);

    (
        login.body["user"]["id"].as_str().unwrap().to_string(),
        login.body["token"].as_str().unwrap().to_string(),
    )
}
