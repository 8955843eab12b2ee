//! Offline queue sync against a mock dashboard API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pulse_client::{
    ActionId, ActionRequest, ActionStatus, ConnectionState, HttpDashboardApi, HttpMethod,
    OfflineAction, OfflineQueueSync, PersistentStore, SyncConfig, SyncOutcome, SyncReport,
};
use serde_json::{Value, json};
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

struct Harness {
    server: MockServer,
    store: Arc<PersistentStore>,
    sync: OfflineQueueSync,
    _dir: tempfile::TempDir,
}

async fn harness(config: SyncConfig) -> Harness {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(PersistentStore::open(dir.path().join("queue.json")));
    let api = Arc::new(HttpDashboardApi::new(server.uri(), Duration::from_secs(5)).unwrap());
    let sync = OfflineQueueSync::new(Arc::clone(&store), api, config);
    Harness {
        server,
        store,
        sync,
        _dir: dir,
    }
}

fn watchlist_add(symbol: &str) -> OfflineAction {
    OfflineAction::WatchlistAdd {
        symbol: symbol.to_string(),
    }
}

async fn mount_profile(server: &MockServer, watchlist: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/api/user/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "preferences": { "watchlist": watchlist } }
        })))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, method_name: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == method_name)
        .collect()
}

fn completed(outcome: SyncOutcome) -> SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Skipped => panic!("pass was skipped"),
    }
}

async fn wait_until_drained(store: &PersistentStore) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.pending_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn watchlist_add_queued_offline_lands_once_when_online() {
    let h = harness(SyncConfig::default()).await;
    mount_profile(&h.server, &["MSFT"]).await;
    Mock::given(method("PUT"))
        .and(path("/api/user/preferences"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    h.sync.enqueue(watchlist_add("AAPL")).await.unwrap();

    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let runner = tokio::spawn({
        let sync = h.sync.clone();
        async move { sync.run(state_rx).await }
    });
    state_tx.send(ConnectionState::Connected).unwrap();
    wait_until_drained(&h.store).await;

    let puts = requests_to(&h.server, "PUT").await;
    assert_eq!(puts.len(), 1);
    let body: Value = serde_json::from_slice(&puts[0].body).unwrap();
    assert_eq!(body, json!({ "preferences": { "watchlist": ["MSFT", "AAPL"] } }));

    h.sync.shutdown();
    runner.await.unwrap();
}

#[tokio::test]
async fn watchlist_add_is_a_noop_when_already_present() {
    let h = harness(SyncConfig::default()).await;
    mount_profile(&h.server, &["AAPL", "MSFT"]).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let id = h.sync.enqueue(watchlist_add("AAPL")).await.unwrap();
    let report = completed(h.sync.sync().await);

    assert_eq!(report.completed, 1);
    assert_eq!(report.swept, 1);
    assert!(h.store.get(id).await.is_none());
    assert!(requests_to(&h.server, "PUT").await.is_empty());
}

#[tokio::test]
async fn action_fails_after_reaching_the_retry_cap() {
    let h = harness(SyncConfig {
        retry_cap: 3,
        classify_client_errors: true,
    })
    .await;
    Mock::given(method("GET"))
        .and(path("/api/user/profile"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    let id = h.sync.enqueue(watchlist_add("AAPL")).await.unwrap();

    for attempt in 1..=2 {
        let report = completed(h.sync.sync().await);
        assert_eq!(report.retried, 1);
        let action = h.store.get(id).await.unwrap();
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.retry_count, attempt);
    }

    let report = completed(h.sync.sync().await);
    assert_eq!(report.failed, 1);
    let action = h.store.get(id).await.unwrap();
    assert_eq!(action.status, ActionStatus::Failed);
    assert_eq!(action.retry_count, 3);
    assert!(action.last_error.unwrap().contains("503"));

    for _ in 0..2 {
        let report = completed(h.sync.sync().await);
        assert_eq!(report.attempted, 0);
    }
    assert_eq!(requests_to(&h.server, "GET").await.len(), 3);
    assert_eq!(h.store.list_failed().await.len(), 1);
}

#[tokio::test]
async fn client_error_fails_without_retrying() {
    let h = harness(SyncConfig::default()).await;
    Mock::given(method("POST"))
        .and(path("/api/newsletter/subscribe"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid email"))
        .mount(&h.server)
        .await;

    let id = h
        .sync
        .enqueue(OfflineAction::NewsletterSubscribe {
            email: "not-an-email".to_string(),
            preferences: json!({}),
            source: "footer".to_string(),
        })
        .await
        .unwrap();

    let report = completed(h.sync.sync().await);
    assert_eq!(report.failed, 1);
    assert_eq!(h.store.get(id).await.unwrap().status, ActionStatus::Failed);
}

#[tokio::test]
async fn actions_are_delivered_in_enqueue_order() {
    const SLOW: Duration = Duration::from_millis(200);

    let h = harness(SyncConfig::default()).await;
    let arrivals: Arc<Mutex<Vec<(String, Instant)>>> = Arc::default();
    for endpoint in ["/api/a1", "/api/a2", "/api/a3"] {
        let log = Arc::clone(&arrivals);
        let delay = if endpoint == "/api/a1" { SLOW } else { Duration::ZERO };
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(move |request: &Request| {
                log.lock().push((request.url.path().to_string(), Instant::now()));
                ResponseTemplate::new(200).set_delay(delay)
            })
            .mount(&h.server)
            .await;
    }

    for endpoint in ["/api/a1", "/api/a2", "/api/a3"] {
        h.sync
            .enqueue(ActionRequest::custom(
                HttpMethod::Post,
                endpoint,
                json!({ "endpoint": endpoint }),
            ))
            .await
            .unwrap();
    }

    let report = completed(h.sync.sync().await);
    assert_eq!(report.completed, 3);

    let arrivals = arrivals.lock().clone();
    let paths: Vec<&str> = arrivals.iter().map(|(path, _)| path.as_str()).collect();
    assert_eq!(paths, vec!["/api/a1", "/api/a2", "/api/a3"]);

    // a2 may only start once a1's slow response has come back.
    let gap = arrivals[1].1.duration_since(arrivals[0].1);
    assert!(gap >= SLOW, "a2 arrived {gap:?} after a1");
}

#[tokio::test]
async fn concurrent_trigger_is_skipped() {
    let h = harness(SyncConfig::default()).await;
    Mock::given(method("DELETE"))
        .and(path("/api/alerts/3"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(300)))
        .mount(&h.server)
        .await;
    h.sync
        .enqueue(ActionRequest::custom(
            HttpMethod::Delete,
            "/api/alerts/3",
            Value::Null,
        ))
        .await
        .unwrap();

    let (first, second) = tokio::join!(h.sync.sync(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.sync.is_syncing());
        h.sync.sync().await
    });

    assert_eq!(completed(first).completed, 1);
    assert_eq!(second, SyncOutcome::Skipped);
    assert_eq!(h.server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn sweep_and_completion_are_idempotent() {
    let h = harness(SyncConfig::default()).await;

    assert_eq!(h.store.sweep_completed().await.unwrap(), 0);
    assert_eq!(h.store.sweep_completed().await.unwrap(), 0);
    h.store.mark_completed(ActionId(42)).await.unwrap();

    let id = h.store.enqueue(watchlist_add("AAPL")).await.unwrap();
    h.store.mark_completed(id).await.unwrap();
    h.store.mark_completed(id).await.unwrap();
    assert_eq!(h.store.sweep_completed().await.unwrap(), 1);
    assert_eq!(h.store.sweep_completed().await.unwrap(), 0);
}

#[tokio::test]
async fn queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    let store = PersistentStore::open(&path);
    let first = store.enqueue(watchlist_add("AAPL")).await.unwrap();
    let second = store.enqueue(watchlist_add("NVDA")).await.unwrap();
    drop(store);

    let reopened = PersistentStore::open(&path);
    let ids: Vec<ActionId> = reopened.list_pending().await.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![first, second]);
}
