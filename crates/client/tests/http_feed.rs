use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use haggl_client::{
    CommandError, CommandGateway, EventStreamClient, HttpFeedClient, ReconnectPolicy,
    TransportError,
};
use haggl_core::config::AppConfig;
use haggl_core::domain::{Phase, VendorStatus};
use haggl_core::reconciler::ConnectionState;
use haggl_core::store::{OrderStore, StoreSettings};
use haggl_core::OrderView;
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Backend {
    stream_connections: Arc<AtomicUsize>,
    recent_limit: Arc<AtomicUsize>,
}

async fn recent(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let limit = params.get("limit").and_then(|raw| raw.parse().ok()).unwrap_or(0);
    backend.recent_limit.store(limit, Ordering::SeqCst);
    // newest first, like the real backend; no stages so live events own the phase
    Json(json!({
        "events": [
            {
                "event_type": "vendor_update", "order_id": "O1",
                "message": "Found supplier Acme", "data": { "vendor_name": "Acme" },
                "timestamp": "2026-01-05T14:03:11.402311"
            },
            {
                "event_type": "log", "order_id": "O1",
                "message": "Searching suppliers", "data": {},
                "timestamp": "2026-01-05T14:03:10.000000"
            }
        ]
    }))
}

async fn stream(State(backend): State<Backend>) -> impl IntoResponse {
    let connection = backend.stream_connections.fetch_add(1, Ordering::SeqCst);
    let body = if connection == 0 {
        concat!(
            ": connected\n\n",
            "data: {\"event_type\":\"call_update\",\"stage\":\"negotiating\",\"order_id\":\"O1\",",
            "\"message\":\"Acme quoted\",\"data\":{\"vendor_name\":\"Acme\",\"call_status\":\"completed\",",
            "\"price_per_unit\":4.25}}\n\n",
            "data: not json\n\n",
            "data: {\"event_type\":\"approval_required\",\"stage\":\"approval_pending\",\n",
            "data: \"order_id\":\"O1\",\"message\":\"Approval needed\",\"data\":{\"vendor_name\":\"Acme\",",
            "\"price\":4.25,\"product\":\"Flour\",\"quantity\":100,\"unit\":\"lb\"}}\n\n",
        )
    } else {
        ": idle\n\n"
    };
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

async fn approve(Json(body): Json<Value>) -> impl IntoResponse {
    match body.get("order_id").and_then(Value::as_str) {
        Some("O1") => (StatusCode::OK, Json(json!({ "status": "approved", "message": "ok" }))),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Order not found" }))),
    }
}

async fn test_event() -> Json<Value> {
    Json(json!({ "status": "sent" }))
}

async fn spawn_backend(backend: Backend) -> SocketAddr {
    let app = Router::new()
        .route("/events/recent", get(recent))
        .route("/events/stream", get(stream))
        .route("/orders/approve", post(approve))
        .route("/events/test", post(test_event))
        .with_state(backend);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test backend");
    let address = listener.local_addr().expect("local address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    address
}

fn feed_client(address: SocketAddr) -> Arc<HttpFeedClient> {
    let mut feed = AppConfig::default().feed;
    feed.base_url = format!("http://{address}/");
    Arc::new(HttpFeedClient::new(&feed).expect("http client builds"))
}

async fn wait_for(store: &OrderStore, condition: impl Fn(&OrderView) -> bool) -> OrderView {
    let mut updates = store.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if condition(&updates.borrow_and_update()) {
                return updates.borrow().clone();
            }
            if updates.changed().await.is_err() {
                return store.snapshot();
            }
        }
    })
    .await
    .expect("view reached expected state in time")
}

#[tokio::test]
async fn http_feed_backfills_streams_and_approves() {
    let backend = Backend::default();
    let address = spawn_backend(backend.clone()).await;
    let transport = feed_client(address);
    let (store, _terminal) = OrderStore::init(StoreSettings::default());

    let stream = EventStreamClient::new(
        transport.clone(),
        store.clone(),
        ReconnectPolicy { delay_ms: 50 },
        50,
    );
    let handle = tokio::spawn(async move { stream.run().await });

    let view = wait_for(&store, |view| {
        !view.pending_approvals.is_empty()
            && view.activity.iter().any(|entry| entry.message == "Searching suppliers")
    })
    .await;
    assert_eq!(backend.recent_limit.load(Ordering::SeqCst), 50);
    assert_eq!(view.phase, Phase::Approval);
    let acme = view.vendor_named("Acme").expect("vendor folded from feed");
    assert_eq!(acme.status, VendorStatus::Answered);
    assert_eq!(acme.price_per_unit.map(|price| price.to_string()).as_deref(), Some("4.25"));
    let pending = view.pending_approval("O1").expect("approval folded from feed");
    assert_eq!(pending.price, acme.price_per_unit.expect("quoted price"));
    assert_eq!(pending.total().normalize().to_string(), "425");

    // the stream body ends after each response, so the client keeps reconnecting
    wait_for(&store, |view| view.connection.reconnect_attempts >= 2).await;

    let gateway = CommandGateway::new(transport.clone(), store.clone());
    let receipt = gateway.approve("O1").await.expect("approve succeeds");
    assert!(receipt.removed_pending);
    assert!(store.snapshot().pending_approvals.is_empty());

    let missing = gateway.approve("O404").await.expect_err("unknown order");
    let CommandError::Transport(TransportError::Status { status, body }) = missing else {
        panic!("expected a status error, got {missing:?}");
    };
    assert_eq!(status, 404);
    assert_eq!(body, "Order not found");

    let probe = gateway.trigger_test_event().await.expect("diagnostic call");
    assert_eq!(probe["status"], "sent");

    store.dispose();
    handle.await.expect("stream task exits");
}

#[tokio::test]
async fn unreachable_backend_marks_the_view_disconnected() {
    // bind then drop to get a port nobody is listening on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local address");
    drop(listener);

    let transport = feed_client(address);
    let (store, _terminal) = OrderStore::init(StoreSettings::default());
    let stream =
        EventStreamClient::new(transport, store.clone(), ReconnectPolicy { delay_ms: 20 }, 50);
    let handle = tokio::spawn(async move { stream.run().await });

    let view = wait_for(&store, |view| {
        view.connection.state == ConnectionState::Disconnected
            && view.connection.backfill_error.is_some()
    })
    .await;
    assert!(view.connection.last_error.is_some());

    store.dispose();
    handle.await.expect("stream task exits");
}
