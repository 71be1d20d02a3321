//! API-level tests driving the axum router end to end.

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use questledger::api;
use questledger::config::Config;
use questledger::db::{self, AppState};
use serde_json::{Value, json};
use serial_test::serial;
use tower::util::ServiceExt; // for `oneshot`

// Helper to create a test app state
async fn setup_test_state() -> AppState {
    let conn = db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB");
    AppState::new(conn, Config::from_env())
}

async fn send_json(
    state: &AppState,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = if let Some(body) = body {
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    } else {
        builder.body(Body::empty()).unwrap()
    };

    let response = api::api_router(state.clone())
        .oneshot(request)
        .await
        .expect("request failed");

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Register a school and return the admin token.
async fn register_demo_school(state: &AppState) -> String {
    let (status, body) = send_json(
        state,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "school_name": "Test School",
            "subdomain": "test",
            "username": "admin",
            "password": "admin-password"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    body["token"].as_str().expect("no token in response").to_string()
}

/// Create a student and log them in, returning their token.
async fn create_and_login_student(state: &AppState, admin_token: &str, username: &str) -> String {
    let (status, body) = send_json(
        state,
        "POST",
        "/accounts",
        Some(admin_token),
        Some(json!({
            "username": username,
            "password": "student-password",
            "role": "student"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "create account failed: {}", body);

    let (status, body) = send_json(
        state,
        "POST",
        "/auth/login",
        None,
        Some(json!({
            "subdomain": "test",
            "username": username,
            "password": "student-password"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().expect("no token in response").to_string()
}

#[tokio::test]
#[serial]
async fn health_endpoint_reports_ok() {
    let state = setup_test_state().await;
    let (status, body) = send_json(&state, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "questledger");
}

#[tokio::test]
#[serial]
async fn requests_without_token_are_rejected() {
    let state = setup_test_state().await;
    let (status, _body) = send_json(&state, "GET", "/accounts/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _body) =
        send_json(&state, "GET", "/accounts/me", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn login_rejects_bad_credentials() {
    let state = setup_test_state().await;
    register_demo_school(&state).await;

    let (status, _body) = send_json(
        &state,
        "POST",
        "/auth/login",
        None,
        Some(json!({
            "subdomain": "test",
            "username": "admin",
            "password": "wrong"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _body) = send_json(
        &state,
        "POST",
        "/auth/login",
        None,
        Some(json!({
            "subdomain": "nope",
            "username": "admin",
            "password": "admin-password"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn students_cannot_use_staff_endpoints() {
    let state = setup_test_state().await;
    let admin_token = register_demo_school(&state).await;
    let student_token = create_and_login_student(&state, &admin_token, "ada").await;

    let (status, _body) = send_json(
        &state,
        "POST",
        "/quests",
        Some(&student_token),
        Some(json!({ "title": "Sneaky quest", "points_award": 1000 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _body) =
        send_json(&state, "GET", "/accounts", Some(&student_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[serial]
async fn quest_to_marketplace_flow() {
    let state = setup_test_state().await;
    let admin_token = register_demo_school(&state).await;
    let student_token = create_and_login_student(&state, &admin_token, "ada").await;

    // Admin publishes a quest and an item.
    let (status, body) = send_json(
        &state,
        "POST",
        "/quests",
        Some(&admin_token),
        Some(json!({ "title": "Read a chapter", "points_award": 50 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "create quest failed: {}", body);
    let quest_id = body["quest"]["id"].as_i64().unwrap();

    let (status, body) = send_json(
        &state,
        "POST",
        "/items",
        Some(&admin_token),
        Some(json!({ "name": "Glitter pencil", "price_points": 30, "stock": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "create item failed: {}", body);
    let item_id = body["item"]["id"].as_i64().unwrap();

    // Student submits the quest.
    let (status, body) = send_json(
        &state,
        "POST",
        &format!("/quests/{}/submissions", quest_id),
        Some(&student_token),
        Some(json!({ "comment": "done!" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "submit failed: {}", body);
    let submission_id = body["submission"]["id"].as_i64().unwrap();

    // Admin sees it pending and approves.
    let (status, body) = send_json(
        &state,
        "GET",
        "/submissions?status=pending",
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["submissions"].as_array().unwrap().len(), 1);

    let (status, body) = send_json(
        &state,
        "PUT",
        &format!("/submissions/{}/approve", submission_id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "approve failed: {}", body);
    assert_eq!(body["submission"]["points_awarded"], 50);

    // A second approval hits the one-way transition.
    let (status, body) = send_json(
        &state,
        "PUT",
        &format!("/submissions/{}/approve", submission_id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    // Student spends the points.
    let (status, body) = send_json(
        &state,
        "POST",
        &format!("/items/{}/purchase", item_id),
        Some(&student_token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "purchase failed: {}", body);
    let purchase_id = body["purchase"]["id"].as_i64().unwrap();
    assert_eq!(body["purchase"]["points_spent"], 30);

    let (status, body) = send_json(&state, "GET", "/accounts/me", Some(&student_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"]["point_balance"], 20);
    assert_eq!(body["account"]["experience"], 50);

    // A purchase beyond the balance is refused cleanly.
    let (status, body) = send_json(
        &state,
        "POST",
        &format!("/items/{}/purchase", item_id),
        Some(&student_token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_funds");

    // Staff hands the pencil over.
    let (status, body) = send_json(
        &state,
        "PUT",
        &format!("/purchases/{}/claim", purchase_id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "claim failed: {}", body);
    assert_eq!(body["purchase"]["status"], "claimed");
}
