use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use codeworker_logs::stream::{
    ConnectionState, ControllerConfig, ReconnectBackoff, SseConnector, StreamController,
    StreamStatus,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

// ===== Helper Functions =====

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct ServerState {
    /// (event name, data); `None` sends an unnamed message
    events: Arc<Vec<(Option<&'static str>, String)>>,
    hold_open: bool,
    hits: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn stream_handler(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> Sse<BoxStream<'static, Result<Event, Infallible>>> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.queries.lock().unwrap().push(query);

    let events: Vec<Result<Event, Infallible>> = state
        .events
        .iter()
        .map(|(name, data)| {
            let event = Event::default().data(data.clone());
            Ok(match name {
                Some(name) => event.event(*name),
                None => event,
            })
        })
        .collect();

    let frames = stream::iter(events);
    let frames = if state.hold_open {
        frames.chain(stream::pending()).boxed()
    } else {
        frames.boxed()
    };
    Sse::new(frames)
}

async fn spawn_server(events: Vec<(Option<&'static str>, String)>, hold_open: bool) -> TestServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let queries = Arc::new(Mutex::new(Vec::new()));
    let state = ServerState {
        events: Arc::new(events),
        hold_open,
        hits: Arc::clone(&hits),
        queries: Arc::clone(&queries),
    };

    let app = Router::new()
        .route("/logs/code-worker/stream", get(stream_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        hits,
        queries,
    }
}

fn log_payload(id: usize, message: &str) -> String {
    format!(
        r#"{{"id":"evt-{}","ts":"2026-01-31T14:50:0{}Z","level":"INFO","stage":"clone","message":"{}"}}"#,
        id, id, message
    )
}

fn sse_controller(config: ControllerConfig) -> StreamController {
    StreamController::new(SseConnector::new().expect("client builds"), config)
}

async fn wait_for_status(
    status_rx: &mut watch::Receiver<StreamStatus>,
    predicate: impl FnMut(&StreamStatus) -> bool,
) -> StreamStatus {
    timeout(WAIT, status_rx.wait_for(predicate))
        .await
        .expect("timed out waiting for status")
        .expect("controller dropped")
        .clone()
}

async fn wait_for_hits(server: &TestServer, expected: usize) {
    timeout(WAIT, async {
        while server.hits.load(Ordering::SeqCst) < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for reconnect");
}

// ===== Live Stream Tests =====

mod live_stream {
    use super::*;

    #[tokio::test]
    async fn should_stream_logs_from_sse_server() {
        // Arrange
        let server = spawn_server(
            vec![
                (Some("connected"), "{}".to_string()),
                (Some("log"), log_payload(1, "cloning")),
                (Some("heartbeat"), "ping".to_string()),
                (Some("log"), "not json".to_string()),
                (Some("log"), log_payload(2, "building")),
                (None, log_payload(3, "done")),
            ],
            true,
        )
        .await;
        let controller = sse_controller(ControllerConfig::default());
        let mut status_rx = controller.subscribe_status();

        // Act
        controller.connect(&format!("{}/", server.base_url), "42");
        let status = wait_for_status(&mut status_rx, |s| s.line_count == 3).await;

        // Assert
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.retry_attempt, 0);
        assert_eq!(status.dropped_count, 1);
        assert!(status.last_heartbeat_at.is_some());

        let ids: Vec<_> = controller.snapshot().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["evt-1", "evt-2", "evt-3"]);
        assert_eq!(
            controller.rendered_lines()[0],
            "[2026-01-31T14:50:01Z] [INFO] [clone] cloning"
        );

        let queries = server.queries.lock().unwrap().clone();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].get("jobId").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn should_omit_job_filter_when_blank() {
        let server = spawn_server(vec![(Some("connected"), "{}".to_string())], true).await;
        let controller = sse_controller(ControllerConfig::default());
        let mut status_rx = controller.subscribe_status();

        controller.connect(&server.base_url, "  ");
        wait_for_status(&mut status_rx, |s| s.state == ConnectionState::Connected).await;

        let queries = server.queries.lock().unwrap().clone();
        assert!(queries[0].get("jobId").is_none());
    }

    #[tokio::test]
    async fn should_reconnect_after_server_closes_stream() {
        // Arrange - every response ends right after one log line
        let server = spawn_server(
            vec![
                (Some("connected"), "{}".to_string()),
                (Some("log"), log_payload(1, "short lived")),
            ],
            false,
        )
        .await;
        let backoff = ReconnectBackoff {
            base_delay_ms: 50,
            max_delay_ms: 200,
            max_exponent: 4,
        };
        let controller = sse_controller(ControllerConfig::default().with_backoff(backoff));

        // Act
        controller.connect(&server.base_url, "");
        wait_for_hits(&server, 3).await;

        // Assert - a disconnect stops the reconnect loop
        controller.disconnect();
        // Let a request already on the wire reach the server
        tokio::time::sleep(Duration::from_millis(100)).await;
        let hits = server.hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(server.hits.load(Ordering::SeqCst), hits);
        let status = controller.status();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert_eq!(status.text, "Disconnected");
        assert!(status.line_count >= 2);
    }

    #[tokio::test]
    async fn should_enter_error_state_on_http_error() {
        // Arrange - nothing is routed under /missing
        let server = spawn_server(vec![], true).await;
        let controller = sse_controller(ControllerConfig::default());
        let mut status_rx = controller.subscribe_status();

        // Act
        controller.connect(&format!("{}/missing", server.base_url), "");
        let status = wait_for_status(&mut status_rx, |s| s.state == ConnectionState::Error).await;

        // Assert
        assert_eq!(status.retry_attempt, 1);
        assert_eq!(status.retry_delay, Some(Duration::from_millis(1000)));
        assert_eq!(status.text, "Connection lost. Reconnecting in 1s...");
        assert_eq!(server.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn should_stop_reconnecting_after_drop() {
        // Arrange
        let server = spawn_server(vec![(Some("connected"), "{}".to_string())], false).await;
        let backoff = ReconnectBackoff {
            base_delay_ms: 50,
            max_delay_ms: 50,
            max_exponent: 0,
        };
        let controller = sse_controller(ControllerConfig::default().with_backoff(backoff));
        controller.connect(&server.base_url, "");
        wait_for_hits(&server, 2).await;

        // Act
        drop(controller);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let hits = server.hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Assert
        assert_eq!(server.hits.load(Ordering::SeqCst), hits);
    }
}

// ===== End-to-End Scenario =====

mod scenario {
    use super::*;

    /// connect -> connected -> 3 logs -> transport error -> retry scheduled
    /// -> manual disconnect -> no reconnect after the delay elapses
    #[tokio::test]
    async fn should_follow_connect_error_disconnect_sequence() {
        // Arrange
        let server = spawn_server(
            vec![
                (Some("connected"), "{}".to_string()),
                (Some("log"), log_payload(1, "a")),
                (Some("log"), log_payload(2, "b")),
                (Some("log"), log_payload(3, "c")),
            ],
            false,
        )
        .await;
        let controller = sse_controller(ControllerConfig::default());
        let mut status_rx = controller.subscribe_status();

        // Act & Assert - stream ends after three lines, retry is scheduled at 1000ms
        controller.connect(&server.base_url, "");
        let status = wait_for_status(&mut status_rx, |s| s.state == ConnectionState::Error).await;
        assert_eq!(status.line_count, 3);
        assert_eq!(status.retry_attempt, 1);
        assert_eq!(status.retry_delay, Some(Duration::from_millis(1000)));
        let ids: Vec<_> = controller.snapshot().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["evt-1", "evt-2", "evt-3"]);

        controller.disconnect();
        assert_eq!(controller.status().state, ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
        assert_eq!(controller.status().state, ConnectionState::Disconnected);
    }
}
