use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Local};
use deskbook::{authenticate::AuthApp, config::Config, routes, BookingApp};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;

struct Response {
    status: StatusCode,
    cookie: Option<String>,
    body: Value,
}

fn test_config() -> Config {
    Config {
        all_available: true,
        ..Config::default()
    }
}

fn build(config: &Config) -> (Router, Arc<RwLock<BookingApp>>) {
    let book_app = Arc::new(RwLock::new(BookingApp::from_config(config)));
    let auth_app = AuthApp::new(config.session_ttl).with_demo_account("demo");
    let app = routes::app(book_app.clone(), Arc::new(RwLock::new(auth_app)));
    (app, book_app)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));

    Response {
        status,
        cookie,
        body,
    }
}

async fn register(app: &Router, email: &str, tier: &str) -> String {
    let response = send(
        app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({
            "name": "Test User",
            "email": email,
            "password": "secret",
            "membershipTier": tier,
        })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    response.cookie.expect("register sets a session cookie")
}

fn tomorrow() -> String {
    (Local::now().date_naive() + Duration::days(1)).to_string()
}

async fn select(app: &Router, cookie: &str, desk: u32, start: &str, end: &str) -> Response {
    send(
        app,
        Method::POST,
        "/api/book/selection",
        Some(cookie),
        Some(json!({
            "date": tomorrow(),
            "deskId": desk,
            "startTime": start,
            "endTime": end,
        })),
    )
    .await
}

#[tokio::test]
async fn registry_is_listed() {
    let (app, _) = build(&test_config());

    let desks = send(&app, Method::GET, "/api/book/desks", None, None).await;
    assert_eq!(desks.status, StatusCode::OK);
    assert_eq!(desks.body.as_array().unwrap().len(), 15);
    assert_eq!(desks.body[10]["type"], "team");

    let slots = send(&app, Method::GET, "/api/book/timeslots", None, None).await;
    assert_eq!(slots.body.as_array().unwrap().len(), 13);
    assert_eq!(slots.body[0]["time"], "8:00");
}

#[tokio::test]
async fn price_quote() {
    let (app, _) = build(&test_config());
    let quote = send(
        &app,
        Method::GET,
        "/api/book/price?tier=Premium&deskType=individual&duration=4",
        None,
        None,
    )
    .await;
    assert_eq!(quote.status, StatusCode::OK);
    assert_eq!(quote.body["price"], 54.0);

    let team = send(
        &app,
        Method::GET,
        "/api/book/price?tier=Basic&deskType=team&duration=2",
        None,
        None,
    )
    .await;
    assert_eq!(team.body["price"], 50.0);
}

#[tokio::test]
async fn booking_lifecycle() {
    let (app, _) = build(&test_config());
    let cookie = register(&app, "ada@example.com", "Premium").await;

    let selection = select(&app, &cookie, 3, "9:00", "13:00").await;
    assert_eq!(selection.status, StatusCode::OK, "{:?}", selection.body);
    assert_eq!(selection.body["price"], 54.0);
    assert_eq!(selection.body["membershipTier"], "Premium");

    let created = send(&app, Method::POST, "/api/book/new", Some(&cookie), None).await;
    assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.body);
    assert_eq!(created.body["totalPrice"], 54.0);
    assert_eq!(created.body["duration"], 4);
    assert_eq!(created.body["startTime"], "9:00");
    let id = created.body["id"].as_str().unwrap().to_string();

    let available = send(
        &app,
        Method::GET,
        &format!(
            "/api/book/available?deskId=3&date={}&startTime=12:00&endTime=14:00",
            tomorrow()
        ),
        None,
        None,
    )
    .await;
    assert_eq!(available.body["available"], false);

    let mine = send(&app, Method::GET, "/api/book/mine", Some(&cookie), None).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.body[0]["date"], tomorrow());
    assert_eq!(mine.body[0]["bookings"][0]["id"], id.as_str());
    assert_eq!(mine.body[0]["bookings"][0]["past"], false);

    let cancelled = send(
        &app,
        Method::POST,
        "/api/book/delete",
        Some(&cookie),
        Some(json!({ "id": id })),
    )
    .await;
    assert_eq!(cancelled.status, StatusCode::OK);

    let events = send(&app, Method::GET, "/api/book/events", None, None).await;
    let events = events.body.as_array().unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|b| b["id"] != id.as_str()));
}

#[tokio::test]
async fn overlapping_booking_conflicts() {
    let (app, book_app) = build(&test_config());
    let ada = register(&app, "ada@example.com", "Basic").await;
    let bob = register(&app, "bob@example.com", "Executive").await;

    select(&app, &ada, 1, "9:00", "12:00").await;
    let first = send(&app, Method::POST, "/api/book/new", Some(&ada), None).await;
    assert_eq!(first.status, StatusCode::CREATED);

    select(&app, &bob, 1, "11:00", "13:00").await;
    let second = send(&app, Method::POST, "/api/book/new", Some(&bob), None).await;
    assert_eq!(second.status, StatusCode::CONFLICT);

    assert_eq!(book_app.read().await.bookings().len(), 4);
}

#[tokio::test]
async fn end_before_start_is_rejected() {
    let (app, _) = build(&test_config());
    let cookie = register(&app, "ada@example.com", "Basic").await;

    let selection = select(&app, &cookie, 4, "12:00", "10:00").await;
    assert_eq!(selection.status, StatusCode::BAD_REQUEST);

    let current = send(&app, Method::GET, "/api/book/selection", Some(&cookie), None).await;
    assert_eq!(current.status, StatusCode::OK);
    assert_eq!(current.body["deskId"], Value::Null);
    assert_eq!(current.body["startTime"], Value::Null);
    assert_eq!(current.body["endTime"], Value::Null);

    let created = send(&app, Method::POST, "/api/book/new", Some(&cookie), None).await;
    assert_eq!(created.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn quote_follows_membership_change() {
    let (app, _) = build(&test_config());
    let cookie = register(&app, "ada@example.com", "Basic").await;

    let selection = select(&app, &cookie, 1, "9:00", "11:00").await;
    assert_eq!(selection.status, StatusCode::OK);
    assert_eq!(selection.body["price"], 20.0);

    let upgraded = send(
        &app,
        Method::POST,
        "/api/membership",
        Some(&cookie),
        Some(json!({ "membershipTier": "Premium" })),
    )
    .await;
    assert_eq!(upgraded.status, StatusCode::OK);

    let current = send(&app, Method::GET, "/api/book/selection", Some(&cookie), None).await;
    assert_eq!(current.body["membershipTier"], "Premium");
    assert_eq!(current.body["price"], 30.0);
}

#[tokio::test]
async fn long_session_ttl_keeps_sessions() {
    let config = Config {
        session_ttl: std::time::Duration::from_secs(u64::MAX),
        ..test_config()
    };
    let (app, _) = build(&config);
    let cookie = register(&app, "ada@example.com", "Basic").await;

    let current = send(&app, Method::GET, "/api/book/selection", Some(&cookie), None).await;
    assert_eq!(current.status, StatusCode::OK);
}

#[tokio::test]
async fn booking_requires_login() {
    let (app, _) = build(&test_config());
    let created = send(&app, Method::POST, "/api/book/new", None, None).await;
    assert_eq!(created.status, StatusCode::UNAUTHORIZED);

    let mine = send(&app, Method::GET, "/api/book/mine", None, None).await;
    assert_eq!(mine.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cancel_rules() {
    let (app, _) = build(&test_config());
    let ada = register(&app, "ada@example.com", "Basic").await;

    // seeded booking owned by the demo user
    let foreign = send(
        &app,
        Method::POST,
        "/api/book/delete",
        Some(&ada),
        Some(json!({ "id": "1" })),
    )
    .await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);

    let login = send(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "email": "demo@deskbook.local", "password": "demo" })),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
    let demo = login.cookie.unwrap();

    let past = send(
        &app,
        Method::POST,
        "/api/book/delete",
        Some(&demo),
        Some(json!({ "id": "1" })),
    )
    .await;
    assert_eq!(past.status, StatusCode::BAD_REQUEST);

    let missing = send(
        &app,
        Method::POST,
        "/api/book/delete",
        Some(&demo),
        Some(json!({ "id": "nope" })),
    )
    .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dashboard_needs_executive() {
    let (app, _) = build(&test_config());
    let cookie = register(&app, "ada@example.com", "Premium").await;

    let denied = send(&app, Method::GET, "/api/dashboard", Some(&cookie), None).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let upgraded = send(
        &app,
        Method::POST,
        "/api/membership",
        Some(&cookie),
        Some(json!({ "membershipTier": "Executive" })),
    )
    .await;
    assert_eq!(upgraded.status, StatusCode::OK);
    assert_eq!(upgraded.body["membershipTier"], "Executive");

    let report = send(&app, Method::GET, "/api/dashboard", Some(&cookie), None).await;
    assert_eq!(report.status, StatusCode::OK);
    assert_eq!(report.body["totalRevenue"], 187.5);
    assert_eq!(report.body["teamBookings"], 1);
    assert_eq!(report.body["revenueByDate"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn sessions() {
    let (app, _) = build(&test_config());
    let cookie = register(&app, "ada@example.com", "Basic").await;

    let duplicate = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({
            "name": "Other",
            "email": "ADA@example.com",
            "password": "x",
            "membershipTier": "Basic",
        })),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let check = send(&app, Method::GET, "/api/login", Some(&cookie), None).await;
    assert_eq!(check.status, StatusCode::ACCEPTED);
    assert_eq!(check.body["user"]["email"], "ada@example.com");
    assert!(check.cookie.is_some(), "session expiry is refreshed");

    let logout = send(&app, Method::GET, "/api/logout", Some(&cookie), None).await;
    assert_eq!(logout.status, StatusCode::OK);

    let after = send(&app, Method::GET, "/api/book/selection", Some(&cookie), None).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);

    let bad_login = send(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong" })),
    )
    .await;
    assert_eq!(bad_login.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn schemas_are_served() {
    let (app, _) = build(&test_config());
    let schema = send(&app, Method::GET, "/api/schema", None, None).await;
    assert_eq!(schema.status, StatusCode::OK);
    assert!(schema.body["Booking"]["properties"]["totalPrice"].is_object());
    assert!(schema.body["RevenueReport"].is_object());
}

#[tokio::test]
async fn bookings_are_mirrored_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bookings.json");
    let config = Config {
        bookings_file: Some(path.clone()),
        seed_bookings: false,
        ..test_config()
    };

    let (app, book_app) = build(&config);
    let cookie = register(&app, "ada@example.com", "Basic").await;
    select(&app, &cookie, 2, "10:00", "11:00").await;
    let created = send(&app, Method::POST, "/api/book/new", Some(&cookie), None).await;
    assert_eq!(created.status, StatusCode::CREATED);

    book_app.read().await.flush().await.unwrap();
    let stored: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored.as_array().unwrap().len(), 1);
    assert_eq!(stored[0]["id"], created.body["id"]);

    drop(app);
    drop(book_app);
    let reopened = BookingApp::from_config(&config);
    assert_eq!(reopened.bookings().len(), 1);
}
