//! Integration tests for request dispatch across modes and policies

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use polly_adapter::adapter::{ConnectivitySignal, Timing, MAX_DELAY};
use polly_adapter::config::{Config, Mode};
use polly_adapter::persister::{MemoryPersister, RecordedRequest, RecordedResponse, RecordingEntry};
use polly_adapter::request::{PollyRequest, RawRequest, RequestHandler, Response};
use polly_adapter::session::{ManualClock, Session};
use polly_adapter::{Action, AdapterHooks, PollyError, Result};

const USERS_URL: &str = "https://api.example.com/users";

fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Transport double that logs hook calls and records into a memory persister
struct MockTransport {
    calls: Arc<Mutex<Vec<String>>>,
    persister: Arc<MemoryPersister>,
    clock: Arc<ManualClock>,
}

#[async_trait]
impl AdapterHooks for MockTransport {
    fn id(&self) -> Result<String> {
        Ok("mock".to_string())
    }

    fn on_connect(&self) -> Result<()> {
        self.calls.lock().unwrap().push("connect".to_string());
        Ok(())
    }

    fn on_disconnect(&self) -> Result<()> {
        self.calls.lock().unwrap().push("disconnect".to_string());
        Ok(())
    }

    async fn on_passthrough(&self, request: &mut PollyRequest) -> Result<()> {
        self.calls.lock().unwrap().push(format!("passthrough {}", request.url));
        Ok(())
    }

    async fn on_intercept(&self, request: &mut PollyRequest, response: &Response) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!(
                "intercept {} {} {:?}",
                request.url,
                response.status,
                request.response.as_ref().map(|r| r.status)
            ));
        Ok(())
    }

    async fn on_record(&self, request: &mut PollyRequest) -> Result<()> {
        self.calls.lock().unwrap().push(format!("record {}", request.url));

        let response = Response {
            status: 200,
            headers: vec![],
            body: b"live".to_vec(),
        };
        self.persister.save_recording_entry(RecordingEntry {
            id: request.id().unwrap().to_string(),
            created_at: chrono_now(&self.clock),
            request: RecordedRequest {
                method: request.method.clone(),
                url: request.url.clone(),
                timestamp: request.timestamp,
            },
            response: RecordedResponse {
                status: response.status,
                headers: response.headers.clone(),
                body: response.body.clone(),
                timestamp: request.timestamp + 40,
            },
        });
        request.response = Some(response);
        Ok(())
    }

    async fn on_replay(&self, request: &mut PollyRequest, entry: &RecordingEntry) -> Result<()> {
        self.calls.lock().unwrap().push(format!(
            "replay {} {}",
            request.url,
            String::from_utf8_lossy(&entry.response.body)
        ));
        request.response = Some(Response {
            status: entry.response.status,
            headers: entry.response.headers.clone(),
            body: entry.response.body.clone(),
        });
        Ok(())
    }
}

fn chrono_now(clock: &ManualClock) -> DateTime<Utc> {
    use polly_adapter::session::Clock;
    clock.now()
}

/// Intercepts and passes through requests by url
struct Routes;

#[async_trait]
impl RequestHandler for Routes {
    async fn setup(&self, request: &mut PollyRequest) -> Result<()> {
        request.should_passthrough = request.url.ends_with("/health");
        request.should_intercept = request.url.ends_with("/teapot");
        Ok(())
    }

    async fn intercept(&self, _request: &PollyRequest, response: &mut Response) -> Result<()> {
        response.status = 418;
        Ok(())
    }

    async fn before_replay(&self, _request: &PollyRequest, entry: &mut RecordingEntry) -> Result<()> {
        if entry.request.url.ends_with("/rewrite") {
            entry.response.body = b"rewritten".to_vec();
        }
        Ok(())
    }
}

struct Harness {
    session: Arc<Session>,
    adapter: Arc<polly_adapter::Adapter>,
    persister: Arc<MemoryPersister>,
    calls: Arc<Mutex<Vec<String>>>,
    clock: Arc<ManualClock>,
    connectivity: Arc<ConnectivitySignal>,
}

impl Harness {
    fn new(config: Config) -> Self {
        Self::with_timing(config, Timing::None)
    }

    fn with_timing(config: Config, timing: Timing) -> Self {
        let persister = Arc::new(MemoryPersister::new());
        let clock = Arc::new(ManualClock::new(epoch()));
        let connectivity = Arc::new(ConnectivitySignal::default());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let session = Arc::new(
            Session::new(config, persister.clone())
                .unwrap()
                .with_clock(clock.clone())
                .with_connectivity(connectivity.clone())
                .with_handler(Arc::new(Routes))
                .with_timing(timing),
        );
        let adapter = session
            .connect_to(MockTransport {
                calls: Arc::clone(&calls),
                persister: Arc::clone(&persister),
                clock: Arc::clone(&clock),
            })
            .unwrap();

        Self {
            session,
            adapter,
            persister,
            calls,
            clock,
            connectivity,
        }
    }

    /// Store an entry for `url` recorded `age_ms` before the clock's current time
    fn store(&self, url: &str, age_ms: i64, body: &str) {
        let id = polly_adapter::fingerprint::request_id("GET", url, &[], b"");
        self.persister.save_recording_entry(RecordingEntry {
            id,
            created_at: chrono_now(&self.clock) - chrono::Duration::milliseconds(age_ms),
            request: RecordedRequest {
                method: "GET".to_string(),
                url: url.to_string(),
                timestamp: 0,
            },
            response: RecordedResponse {
                status: 200,
                headers: vec![],
                body: body.as_bytes().to_vec(),
                timestamp: 250,
            },
        });
    }

    /// Hook calls after connecting
    fn dispatched(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c != "connect" && *c != "disconnect")
            .cloned()
            .collect()
    }
}

fn config(mode: Mode) -> Config {
    Config {
        mode,
        ..Config::default()
    }
}

fn expiring(record_if_expired: bool) -> Config {
    Config {
        mode: Mode::Replay,
        record_if_missing: false,
        record_if_expired,
        expires_in: Some("1000ms".to_string()),
        timing: None,
    }
}

#[tokio::test]
async fn test_passthrough_mode_ignores_recordings() {
    let harness = Harness::new(config(Mode::Passthrough));
    harness.store(USERS_URL, 0, "stored");

    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Passthrough);
    assert_eq!(handled.request.action(), Some(Action::Passthrough));
    assert_eq!(harness.dispatched(), vec![format!("passthrough {USERS_URL}")]);
}

#[tokio::test]
async fn test_passthrough_flag_in_every_mode() {
    for mode in [Mode::Record, Mode::Replay, Mode::Passthrough] {
        let harness = Harness::new(config(mode));
        let url = "https://api.example.com/health";
        harness.store(url, 0, "stored");

        let handled = harness
            .adapter
            .handle_request(RawRequest::new("GET", url))
            .await
            .unwrap();

        assert_eq!(handled.action, Action::Passthrough, "mode {mode:?}");
    }
}

#[tokio::test]
async fn test_intercept_delivers_handler_response() {
    let harness = Harness::new(config(Mode::Replay));
    let url = "https://api.example.com/teapot";

    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", url))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Intercept);
    assert_eq!(handled.request.response.as_ref().unwrap().status, 418);
    assert_eq!(harness.dispatched(), vec![format!("intercept {url} 418 Some(418)")]);
}

#[tokio::test]
async fn test_record_mode_records() {
    let harness = Harness::new(config(Mode::Record));
    harness.store(USERS_URL, 0, "stored");

    let handled = harness
        .adapter
        .handle_request(RawRequest::new("get", USERS_URL))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Record);
    assert_eq!(handled.request.method, "GET");
    assert_eq!(harness.dispatched(), vec![format!("record {USERS_URL}")]);
}

#[tokio::test]
async fn test_replay_found_entry() {
    let harness = Harness::new(config(Mode::Replay));
    harness.store(USERS_URL, 0, "stored");

    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Replay);
    assert_eq!(handled.request.response.unwrap().body, b"stored");
    assert_eq!(harness.dispatched(), vec![format!("replay {USERS_URL} stored")]);
}

#[tokio::test]
async fn test_before_replay_can_rewrite_entry() {
    let harness = Harness::new(config(Mode::Replay));
    let url = "https://api.example.com/rewrite";
    harness.store(url, 0, "original");

    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", url))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Replay);
    assert_eq!(harness.dispatched(), vec![format!("replay {url} rewritten")]);
}

#[tokio::test]
async fn test_missing_recording_records_when_allowed() {
    let harness = Harness::new(config(Mode::Replay));

    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Record);
    assert_eq!(harness.persister.size(), 1);
}

#[tokio::test]
async fn test_missing_recording_fails_when_disallowed() {
    let harness = Harness::new(Config {
        record_if_missing: false,
        ..config(Mode::Replay)
    });

    let err = harness
        .adapter
        .handle_request(RawRequest::new("POST", USERS_URL))
        .await
        .unwrap_err();

    match &err {
        PollyError::MissingRecording {
            adapter,
            method,
            url,
        } => {
            assert_eq!(adapter, "mock");
            assert_eq!(method, "POST");
            assert_eq!(url, USERS_URL);
        }
        other => panic!("expected MissingRecording, got {other:?}"),
    }
    assert!(err.to_string().contains(&format!("POST {USERS_URL}")));
    assert!(err.is_fatal());
    assert!(harness.dispatched().is_empty());
    assert_eq!(harness.session.failure_count(), 1);
}

#[tokio::test]
async fn test_expired_entry_re_recorded_when_online() {
    let harness = Harness::new(expiring(true));
    harness.store(USERS_URL, 2000, "stale");

    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Record);
    assert_eq!(harness.dispatched(), vec![format!("record {USERS_URL}")]);
}

#[tokio::test]
async fn test_expired_entry_replayed_when_offline() {
    let harness = Harness::new(expiring(true));
    harness.connectivity.set_online(false);
    harness.store(USERS_URL, 2000, "stale");

    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Replay);
    assert_eq!(harness.dispatched(), vec![format!("replay {USERS_URL} stale")]);
}

#[tokio::test]
async fn test_expired_entry_replayed_when_re_record_disabled() {
    let harness = Harness::new(expiring(false));
    harness.store(USERS_URL, 2000, "stale");

    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Replay);
}

#[tokio::test]
async fn test_fresh_entry_replayed() {
    let harness = Harness::new(expiring(true));
    harness.store(USERS_URL, 500, "fresh");

    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Replay);
}

#[tokio::test]
async fn test_entry_expires_as_clock_advances() {
    let harness = Harness::new(expiring(true));
    harness.store(USERS_URL, 0, "stored");

    let first = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();
    harness.clock.advance(chrono::Duration::milliseconds(1500));
    let second = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(first.action, Action::Replay);
    assert_eq!(second.action, Action::Record);
}

#[tokio::test(start_paused = true)]
async fn test_timing_delays_replay() {
    let harness = Harness::with_timing(
        config(Mode::Replay),
        Timing::custom(|req, res| Duration::from_millis(res - req)),
    );
    harness.store(USERS_URL, 0, "stored");

    let start = tokio::time::Instant::now();
    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Replay);
    assert!(start.elapsed() >= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_huge_relative_timing_is_capped() {
    let harness = Harness::with_timing(config(Mode::Replay), Timing::Relative(1e300));
    harness.store(USERS_URL, 0, "stored");

    let start = tokio::time::Instant::now();
    let handled = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(handled.action, Action::Replay);
    let elapsed = start.elapsed();
    assert!(elapsed >= MAX_DELAY);
    assert!(elapsed < MAX_DELAY + Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_no_timing_replays_immediately() {
    let harness = Harness::new(config(Mode::Replay));
    harness.store(USERS_URL, 0, "stored");

    let start = tokio::time::Instant::now();
    harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_record_then_replay_round_trip() {
    let harness = Harness::new(config(Mode::Record));

    let recorded = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();
    harness.session.replay().await;
    let replayed = harness
        .adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap();

    assert_eq!(recorded.action, Action::Record);
    assert_eq!(replayed.action, Action::Replay);
    assert_eq!(replayed.request.response.unwrap().body, b"live");
    assert_eq!(
        harness.adapter.stats(),
        polly_adapter::adapter::DispatchStats {
            passthrough: 0,
            intercept: 0,
            record: 1,
            replay: 1,
        }
    );
}

#[tokio::test]
async fn test_stopped_session_rejects_requests() {
    let harness = Harness::new(config(Mode::Record));
    harness.session.stop().await.unwrap();

    let err = harness
        .adapter
        .handle_request(RawRequest::new("DELETE", USERS_URL))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PollyError::UnhandledRequest { ref method, ref url, .. }
            if method == "DELETE" && url == USERS_URL
    ));
    assert!(harness.dispatched().is_empty());
    assert!(!harness.adapter.is_connected());
}

#[tokio::test]
async fn test_each_request_invokes_one_hook() {
    let harness = Harness::new(config(Mode::Replay));
    harness.store(USERS_URL, 0, "stored");

    let urls = [
        USERS_URL,
        "https://api.example.com/health",
        "https://api.example.com/teapot",
        "https://api.example.com/orders",
    ];
    for url in urls {
        harness
            .adapter
            .handle_request(RawRequest::new("GET", url))
            .await
            .unwrap();
    }

    assert_eq!(harness.dispatched().len(), urls.len());
    assert_eq!(harness.adapter.stats().total(), urls.len());
}

#[tokio::test]
async fn test_concurrent_requests() {
    let harness = Harness::new(config(Mode::Replay));
    harness.store(USERS_URL, 0, "stored");

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let adapter = Arc::clone(&harness.adapter);
        tasks.spawn(async move {
            adapter
                .handle_request(RawRequest::new("GET", USERS_URL))
                .await
                .map(|handled| handled.action)
        });
    }

    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap(), Action::Replay);
    }
    assert_eq!(harness.adapter.stats().replay, 16);
}

struct RecordOnly;

#[async_trait]
impl AdapterHooks for RecordOnly {
    fn id(&self) -> Result<String> {
        Ok("record-only".to_string())
    }

    fn on_connect(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_missing_hook_surfaces_not_implemented() {
    let session = Arc::new(
        Session::new(config(Mode::Record), Arc::new(MemoryPersister::new())).unwrap(),
    );
    let adapter = session.connect_to(RecordOnly).unwrap();

    let err = adapter
        .handle_request(RawRequest::new("GET", USERS_URL))
        .await
        .unwrap_err();

    assert!(matches!(err, PollyError::NotImplemented { hook: "on_record" }));
    assert_eq!(session.failure_count(), 1);
    assert!(matches!(
        session.stop().await,
        Err(PollyError::NotImplemented {
            hook: "on_disconnect"
        })
    ));
    assert_eq!(session.failure_count(), 2);
    assert!(session.adapter("record-only").is_some());
}
