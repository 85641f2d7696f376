//! HTTP surface driven through the router with in-memory backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use vtrim_api::{create_router, ApiConfig, AppState, Backends, OwnerId, SourceProber};
use vtrim_media::{MediaError, MediaResult};
use vtrim_models::{
    FormatInfo, JobEvent, JobState, Priority, SourceInfo, SubmissionLimits, WsServerMessage,
};
use vtrim_queue::{EventPublisher, JobQueue, MemoryJobQueue, MemoryNotifier, MemoryStatusStore};
use vtrim_storage::FsBlobStore;

/// Prober returning a fixed duration, or "video unavailable".
struct ScriptedProber {
    duration: Option<f64>,
    calls: AtomicUsize,
}

#[async_trait]
impl SourceProber for ScriptedProber {
    async fn probe(&self, _url: &str) -> MediaResult<SourceInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.duration {
            Some(duration) => Ok(SourceInfo {
                title: "Demo".into(),
                thumbnail: None,
                duration: Some(duration),
                formats: vec![FormatInfo {
                    format_id: "18".into(),
                    resolution: "360p".into(),
                    ext: "mp4".into(),
                }],
            }),
            None => Err(MediaError::SourceUnavailable("Video unavailable".into())),
        }
    }
}

struct Harness {
    _blobs: TempDir,
    state: AppState,
    app: Router,
    queue: Arc<MemoryJobQueue>,
    notifier: Arc<MemoryNotifier>,
    status: Arc<MemoryStatusStore>,
    prober: Arc<ScriptedProber>,
}

impl Harness {
    fn new(source_duration: Option<f64>) -> Self {
        let blobs = TempDir::new().unwrap();
        let queue = Arc::new(MemoryJobQueue::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let status = Arc::new(MemoryStatusStore::new());
        let prober = Arc::new(ScriptedProber {
            duration: source_duration,
            calls: AtomicUsize::new(0),
        });
        let state = AppState::new(
            ApiConfig::default(),
            SubmissionLimits::default(),
            Backends {
                queue: queue.clone(),
                notifier: notifier.clone(),
                status: status.clone(),
                store: Arc::new(FsBlobStore::new(blobs.path())),
                prober: prober.clone(),
            },
        );
        let app = create_router(state.clone(), None);
        Self {
            _blobs: blobs,
            state,
            app,
            queue,
            notifier,
            status,
            prober,
        }
    }

    async fn call(&self, method: &str, uri: &str, owner: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(owner) = owner {
            builder = builder.header("x-owner-id", owner);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn submit(&self, owner: &str, start: f64, end: f64, connection_id: &str) -> (StatusCode, Value) {
        let body = json!({
            "connectionId": connection_id,
            "source": {"kind": "url", "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"},
            "formatId": "best",
            "start": start,
            "end": end,
        });
        self.call("POST", "/api/jobs", Some(owner), Some(body)).await
    }

    async fn total_queued(&self) -> u64 {
        self.queue.len(Priority::Express).await.unwrap() + self.queue.len(Priority::Standard).await.unwrap()
    }
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new(Some(60.0));
    let (status, body) = h.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = h.call("GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_missing_owner_is_unauthorized() {
    let h = Harness::new(Some(60.0));
    let (status, _) = h.call("GET", "/api/queue/status", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let body = json!({"source": {"kind": "url", "url": "https://example.com/v"}, "start": 0, "end": 10});
    let (status, _) = h.call("POST", "/api/jobs", None, Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.total_queued().await, 0);
}

#[tokio::test]
async fn test_submit_enqueues_and_notifies() {
    let h = Harness::new(Some(212.0));
    let mut events = h.notifier.register("conn-1").unwrap();

    let (status, body) = h.submit("alice", 0.0, 10.0, "conn-1").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["priority"], "express");
    assert_eq!(h.queue.len(Priority::Express).await.unwrap(), 1);

    match events.recv().await.unwrap() {
        JobEvent::Queued { job_id, priority } => {
            assert_eq!(job_id.as_str(), body["jobId"].as_str().unwrap());
            assert_eq!(priority, Priority::Express);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let (status, queue) = h.call("GET", "/api/queue/status", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["express"], 1);
    assert_eq!(queue["standard"], 0);
}

#[tokio::test]
async fn test_long_clip_goes_to_standard_lane() {
    let h = Harness::new(Some(4000.0));
    let (status, body) = h.submit("alice", 0.0, 2000.0, "conn-1").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["priority"], "standard");
    assert_eq!(h.queue.len(Priority::Standard).await.unwrap(), 1);
}

#[tokio::test]
async fn test_reversed_range_rejected_without_probe() {
    let h = Harness::new(Some(212.0));
    let (status, body) = h.submit("alice", 20.0, 10.0, "conn-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
    assert_eq!(h.total_queued().await, 0);
    assert_eq!(h.prober.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_range_past_source_end_rejected() {
    let h = Harness::new(Some(60.0));
    let (status, body) = h.submit("alice", 30.0, 90.0, "conn-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
    assert_eq!(h.total_queued().await, 0);
}

#[tokio::test]
async fn test_unavailable_source_rejected() {
    let h = Harness::new(None);
    let (status, body) = h.submit("alice", 0.0, 10.0, "conn-1").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "source_unavailable");
    assert_eq!(h.total_queued().await, 0);
}

#[tokio::test]
async fn test_internal_source_url_rejected() {
    let h = Harness::new(Some(60.0));
    let body = json!({
        "source": {"kind": "url", "url": "http://169.254.169.254/latest/meta-data"},
        "start": 0,
        "end": 10,
    });
    let (status, _) = h.call("POST", "/api/jobs", Some("alice"), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.prober.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_job_status_is_owner_scoped() {
    let h = Harness::new(Some(212.0));
    let (_, body) = h.submit("alice", 0.0, 10.0, "conn-1").await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let (status, snapshot) = h.call("GET", &format!("/api/jobs/{job_id}"), Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["state"], "queued");
    assert_eq!(snapshot["progress"], 0);

    let (status, _) = h.call("GET", &format!("/api/jobs/{job_id}"), Some("mallory"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.call("GET", "/api/jobs/not-a-uuid", Some("alice"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = uuid::Uuid::new_v4();
    let (status, _) = h.call("GET", &format!("/api/jobs/{unknown}"), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_result_url_after_completion() {
    let h = Harness::new(Some(212.0));
    let (_, body) = h.submit("alice", 0.0, 10.0, "conn-1").await;
    let job_id = body["jobId"].as_str().unwrap().to_string();
    let uri = format!("/api/jobs/{job_id}/result");

    let (status, _) = h.call("GET", &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let job = h
        .queue
        .dequeue_next(Duration::from_millis(10))
        .await
        .unwrap()
        .expect("submitted job");
    let events = EventPublisher::new(h.state.notifier.clone(), h.status.clone());
    events
        .publish(&job, JobEvent::completed(job.id.clone(), job.result_key(), None))
        .await;

    let (status, result) = h.call("GET", &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["resultRef"], job.result_key());
    assert!(result["url"].as_str().unwrap().starts_with("file://"));
    assert_eq!(result["expiresIn"], 3600);

    let (_, snapshot) = h.call("GET", &format!("/api/jobs/{job_id}"), Some("alice"), None).await;
    assert_eq!(snapshot["state"], JobState::Completed.as_str());
}

#[tokio::test]
async fn test_upload_init() {
    let h = Harness::new(Some(60.0));
    let (status, body) = h
        .call(
            "POST",
            "/api/uploads",
            Some("alice"),
            Some(json!({"contentType": "video/quicktime", "size": 1024})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let key = body["fileKey"].as_str().unwrap();
    assert!(key.starts_with("uploads/alice/"));
    assert!(key.ends_with(".mov"));
    assert!(body["uploadUrl"].as_str().unwrap().starts_with("file://"));

    let (status, _) = h
        .call(
            "POST",
            "/api/uploads",
            Some("alice"),
            Some(json!({"contentType": "image/png", "size": 1024})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(
            "POST",
            "/api/uploads",
            Some("alice"),
            Some(json!({"contentType": "video/mp4", "size": 200u64 * 1024 * 1024})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_rate_limited_per_owner() {
    let h = Harness::new(Some(60.0));
    let body = json!({"contentType": "video/mp4", "size": 1024});
    for _ in 0..5 {
        let (status, _) = h.call("POST", "/api/uploads", Some("alice"), Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = h.call("POST", "/api/uploads", Some("alice"), Some(body.clone())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = h.call("POST", "/api/uploads", Some("bob"), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_video_info() {
    let h = Harness::new(Some(212.0));
    let (status, body) = h
        .call(
            "POST",
            "/api/videos/info",
            Some("alice"),
            Some(json!({"url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Demo");
    assert_eq!(body["duration"], 212.0);
    assert_eq!(body["formats"][0]["formatId"], "18");
}

#[tokio::test]
async fn test_socket_messages() {
    let h = Harness::new(Some(212.0));
    let owner = OwnerId("alice".into());
    let mut events = h.notifier.register("conn-ws").unwrap();

    let pong = vtrim_api::ws::handle_client_message(&h.state, &owner, "conn-ws", r#"{"type":"ping"}"#).await;
    assert_eq!(pong, Some(WsServerMessage::Pong));

    let garbage = vtrim_api::ws::handle_client_message(&h.state, &owner, "conn-ws", "not json").await;
    assert!(matches!(garbage, Some(WsServerMessage::Error { .. })));

    let reversed = r#"{"type":"submit","source":{"kind":"url","url":"https://example.com/v"},"start":20,"end":10}"#;
    match vtrim_api::ws::handle_client_message(&h.state, &owner, "conn-ws", reversed).await {
        Some(WsServerMessage::Rejected { reason, .. }) => assert_eq!(reason, "validation"),
        other => panic!("unexpected reply {:?}", other),
    }
    assert_eq!(h.total_queued().await, 0);

    let valid = r#"{"type":"submit","source":{"kind":"url","url":"https://example.com/v"},"start":0,"end":10}"#;
    let reply = vtrim_api::ws::handle_client_message(&h.state, &owner, "conn-ws", valid).await;
    assert!(reply.is_none());
    assert!(matches!(events.recv().await, Some(JobEvent::Queued { .. })));
}
