use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;

use super::*;

#[derive(Clone)]
struct MockSheetState {
    rows: Arc<std::sync::Mutex<Vec<VoteRow>>>,
    read_count: Arc<AtomicUsize>,
    fail_status: Arc<std::sync::Mutex<Option<StatusCode>>>,
}

impl MockSheetState {
    fn new() -> Self {
        Self {
            rows: Arc::new(std::sync::Mutex::new(Vec::new())),
            read_count: Arc::new(AtomicUsize::new(0)),
            fail_status: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    fn set_rows(&self, rows: Vec<VoteRow>) {
        *self.rows.lock().expect("rows lock") = rows;
    }

    fn fail_with(&self, status: StatusCode) {
        *self.fail_status.lock().expect("fail lock") = Some(status);
    }
}

async fn mock_read(
    State(state): State<MockSheetState>,
    Path(_sheet): Path<String>,
) -> Result<Json<SheetPayload>, StatusCode> {
    if let Some(status) = *state.fail_status.lock().expect("fail lock") {
        return Err(status);
    }
    state.read_count.fetch_add(1, Ordering::SeqCst);
    let rows = state.rows.lock().expect("rows lock").clone();
    Ok(Json(SheetPayload { rows }))
}

async fn mock_write(
    State(state): State<MockSheetState>,
    Path(_sheet): Path<String>,
    Json(payload): Json<SheetPayload>,
) -> Result<StatusCode, StatusCode> {
    if let Some(status) = *state.fail_status.lock().expect("fail lock") {
        return Err(status);
    }
    *state.rows.lock().expect("rows lock") = payload.rows;
    Ok(StatusCode::NO_CONTENT)
}

async fn spawn_sheet_server() -> (Url, MockSheetState) {
    let state = MockSheetState::new();
    let app = Router::new()
        .route("/sheets/:sheet/values", get(mock_read).put(mock_write))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let base = Url::parse(&format!("http://{addr}/")).expect("base url");
    (base, state)
}

fn row(user: &str, pair: &str, winner: &str) -> VoteRow {
    VoteRow {
        user_id: user.to_string(),
        pair_id: pair.to_string(),
        winner: winner.to_string(),
        timestamp: "2026-08-28 10:00:00".to_string(),
    }
}

#[tokio::test]
async fn write_then_read_round_trips_rows_in_order() {
    let (base, _state) = spawn_sheet_server().await;
    let client = SheetStoreClient::new(base, None);

    let rows = vec![row("u1", "1", "a.png"), row("u1", "2", "neither")];
    client.write("Sheet1", &rows).await.expect("write");

    let read_back = client.read("Sheet1", true).await.expect("read");
    assert_eq!(read_back, rows);
}

#[tokio::test]
async fn cached_read_serves_stale_view_until_fresh_requested() {
    let (base, state) = spawn_sheet_server().await;
    let client = SheetStoreClient::new(base, None);

    state.set_rows(vec![row("u1", "1", "a.png")]);
    let first = client.read("Sheet1", false).await.expect("read");
    assert_eq!(first.len(), 1);

    // A concurrent writer appends behind our back.
    state.set_rows(vec![row("u1", "1", "a.png"), row("u2", "1", "b.png")]);

    let cached = client.read("Sheet1", false).await.expect("cached read");
    assert_eq!(cached.len(), 1, "cached-read mode may serve the stale view");

    let fresh = client.read("Sheet1", true).await.expect("fresh read");
    assert_eq!(fresh.len(), 2, "fresh read must reflect prior writes");
}

#[tokio::test]
async fn successful_write_repopulates_the_read_cache() {
    let (base, state) = spawn_sheet_server().await;
    let client = SheetStoreClient::new(base, None);

    let rows = vec![row("u1", "1", "a.png")];
    client.write("Sheet1", &rows).await.expect("write");

    let before = state.read_count.load(Ordering::SeqCst);
    let cached = client.read("Sheet1", false).await.expect("read");
    assert_eq!(cached, rows);
    assert_eq!(
        state.read_count.load(Ordering::SeqCst),
        before,
        "cached read after write must not hit the server"
    );
}

#[tokio::test]
async fn rate_limit_and_permission_statuses_map_to_typed_errors() {
    let (base, state) = spawn_sheet_server().await;
    let client = SheetStoreClient::new(base, None);

    state.fail_with(StatusCode::TOO_MANY_REQUESTS);
    let err = client.read("Sheet1", true).await.expect_err("429");
    assert!(matches!(err, StoreError::RateLimited(_)), "got {err:?}");

    state.fail_with(StatusCode::FORBIDDEN);
    let err = client
        .write("Sheet1", &[row("u", "1", "neither")])
        .await
        .expect_err("403");
    assert!(matches!(err, StoreError::PermissionDenied(_)), "got {err:?}");

    state.fail_with(StatusCode::INTERNAL_SERVER_ERROR);
    let err = client.read("Sheet1", true).await.expect_err("500");
    assert!(matches!(err, StoreError::Unavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_host_maps_to_unavailable() {
    // Reserve a port, then close the listener so nothing answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let base = Url::parse(&format!("http://{addr}/")).expect("base url");
    let client = SheetStoreClient::new(base, None);
    let err = client.read("Sheet1", true).await.expect_err("no server");
    assert!(matches!(err, StoreError::Unavailable(_)), "got {err:?}");
}
