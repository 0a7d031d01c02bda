use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use sqlx::AnyPool;
use tower::ServiceExt;
use uuid::Uuid;

use pricing::{Snapshot, SqlPriceStore};
use scheduler::{Phase, SchedulerConfig};
use troy_backend::api::{self, AppState};
use troy_backend::db::Db;
use troy_backend::events::PRICES_EVENT;

const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/public");

struct TestApp {
    app: Router,
    state: AppState,
    store: Arc<SqlPriceStore>,
    pool: AnyPool,
}

/// Fresh in-memory database with two stores and two products listed.
async fn test_app(cfg: SchedulerConfig) -> TestApp {
    let url = format!("sqlite:file:{}?mode=memory&cache=shared", Uuid::new_v4());
    let db = Db::connect(&url).await.expect("connect sqlite memory db");
    db.migrate().await.expect("migrate");

    let store = Arc::new(SqlPriceStore::new(db.pool.clone(), "XAU/CAD"));
    store.upsert_store(1, "Bullion North", "https://north.example").await.unwrap();
    store.upsert_store(2, "Bullion South", "https://south.example").await.unwrap();
    store.upsert_product(10, "1 oz Maple Leaf").await.unwrap();
    store.upsert_product(20, "1 oz Kangaroo").await.unwrap();
    store.link_store_product(1, 10, "https://north.example/maple").await.unwrap();
    store.link_store_product(2, 10, "https://south.example/maple").await.unwrap();
    store.link_store_product(1, 20, "https://north.example/roo").await.unwrap();

    let state = AppState::new(store.clone(), cfg, 16);
    let app = api::router(state.clone(), STATIC_DIR);

    TestApp {
        app,
        state,
        store,
        pool: db.pool,
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn observation(store: i64, product: i64, price: f64, t: &str) -> Value {
    json!({ "c": 7, "t": t, "s": store, "p": product, "v": price })
}

fn prices_of(body: &Value, product: &str) -> Vec<f64> {
    body["products"][product]
        .as_array()
        .unwrap_or_else(|| panic!("no group for product {product}: {body}"))
        .iter()
        .map(|row| row["price"].as_f64().unwrap())
        .collect()
}

#[tokio::test]
async fn ingest_persists_and_marks_update_pending() {
    let t = test_app(SchedulerConfig::default()).await;
    t.store
        .record_spot(3_400.0, Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap())
        .await
        .unwrap();

    let (status, body) = send(
        &t.app,
        post_json("/incoming", observation(1, 10, 3_125.5, "2024-05-01T12:00:00Z")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Item added successfully" }));
    assert_eq!(t.state.scheduler.phase(), Phase::Pending);
    assert_eq!(
        t.state.scheduler.counters().notifications.load(std::sync::atomic::Ordering::Relaxed),
        1
    );

    let (status, body) = send(&t.app, get("/prices")).await;
    assert_eq!(status, StatusCode::OK);

    let row = &body["products"]["10"][0];
    assert_eq!(row["price"].as_f64(), Some(3_125.5));
    assert_eq!(row["spot_price"].as_f64(), Some(3_400.0));
    assert_eq!(row["store_name"], "Bullion North");
    assert_eq!(row["product_url"], "https://north.example/maple");
    assert_eq!(body["spot"].as_f64(), Some(3_400.0));
}

#[tokio::test]
async fn incomplete_payloads_are_rejected_without_notifying() {
    let t = test_app(SchedulerConfig::default()).await;

    let bodies = [
        json!({}),
        json!({ "c": 7, "t": "2024-05-01T12:00:00Z", "s": 1, "v": 10.0 }),
        json!({ "c": 0, "t": "2024-05-01T12:00:00Z", "s": 1, "p": 10, "v": 10.0 }),
        json!({ "c": 7, "t": "2024-05-01T12:00:00Z", "s": 1, "p": 10, "v": null }),
        json!({ "c": 7, "t": "", "s": 1, "p": 10, "v": 10.0 }),
    ];

    for payload in bodies {
        let (status, body) = send(&t.app, post_json("/incoming", payload.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
        assert_eq!(body, json!({ "error": "Missing fields" }), "payload {payload}");
    }

    assert_eq!(t.state.scheduler.phase(), Phase::Idle);
    let (_, body) = send(&t.app, get("/prices")).await;
    assert_eq!(body["products"], json!({}));
}

#[tokio::test]
async fn bad_timestamp_and_bad_json_are_bad_requests() {
    let t = test_app(SchedulerConfig::default()).await;

    let (status, body) = send(
        &t.app,
        post_json("/incoming", observation(1, 10, 1.0, "last tuesday")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid timestamp"));

    let req = Request::builder()
        .method("POST")
        .uri("/incoming")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(t.state.scheduler.phase(), Phase::Idle);
}

#[tokio::test]
async fn prices_keep_latest_per_store_sorted_and_filterable() {
    let t = test_app(SchedulerConfig::default()).await;

    for obs in [
        observation(1, 10, 3_200.0, "2024-05-01T12:00:00Z"),
        observation(1, 10, 3_150.0, "2024-05-01T12:05:00Z"),
        observation(2, 10, 3_180.0, "2024-05-01T12:01:00Z"),
        observation(1, 20, 4_000.0, "2024-05-01T12:02:00Z"),
    ] {
        let (status, _) = send(&t.app, post_json("/incoming", obs)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = send(&t.app, get("/prices")).await;
    assert_eq!(prices_of(&body, "10"), vec![3_150.0, 3_180.0]);
    assert_eq!(prices_of(&body, "20"), vec![4_000.0]);

    let (status, body) = send(&t.app, get("/prices?product_id=20")).await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&String> = body["products"].as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["20"]);
}

#[tokio::test]
async fn spot_endpoint_reports_latest_ask() {
    let t = test_app(SchedulerConfig::default()).await;

    let (status, body) = send(&t.app, get("/spot")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "spot": null }));

    t.store
        .record_spot(3_390.0, Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
        .await
        .unwrap();
    t.store
        .record_spot(3_410.25, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        .await
        .unwrap();

    let (_, body) = send(&t.app, get("/spot")).await;
    assert_eq!(body["spot"].as_f64(), Some(3_410.25));
}

#[tokio::test]
async fn database_failure_is_500_and_does_not_notify() {
    let t = test_app(SchedulerConfig::default()).await;
    sqlx::query("DROP TABLE prices_real_time")
        .execute(&t.pool)
        .await
        .unwrap();

    let (status, body) = send(
        &t.app,
        post_json("/incoming", observation(1, 10, 1.0, "2024-05-01T12:00:00Z")),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Database error" }));
    assert_eq!(t.state.scheduler.phase(), Phase::Idle);

    let (status, body) = send(&t.app, get("/prices")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Database error" }));
}

#[tokio::test]
async fn index_and_event_stream_are_served() {
    let t = test_app(SchedulerConfig::default()).await;

    let resp = t.app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/html"), "{content_type}");

    let resp = t.app.clone().oneshot(get("/events")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"), "{content_type}");
}

#[tokio::test]
async fn burst_of_ingests_reaches_subscribers_as_one_snapshot() {
    let cfg = SchedulerConfig {
        debounce_interval: Duration::from_millis(100),
        ..Default::default()
    };
    let t = test_app(cfg).await;
    let mut rx = t.state.events.subscribe();

    for (store, price, at) in [
        (1, 3_200.0, "2024-05-01T12:00:00Z"),
        (2, 3_180.0, "2024-05-01T12:00:10Z"),
        (1, 3_190.0, "2024-05-01T12:00:20Z"),
    ] {
        let req = post_json("/incoming", observation(store, 10, price, at));
        let (status, _) = send(&t.app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("flush within timeout")
        .expect("event bus open");

    assert_eq!(event.name, PRICES_EVENT);
    let snapshot: Snapshot = serde_json::from_str(&event.data).unwrap();
    let prices: Vec<f64> = snapshot.products[&10].iter().map(|r| r.price).collect();
    assert_eq!(prices, vec![3_180.0, 3_190.0]);

    // Nothing else was queued: the three ingests coalesced.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(t.state.scheduler.phase(), Phase::Idle);
    assert_eq!(t.state.scheduler.counters().flushes(), 1);
}
