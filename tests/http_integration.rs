//! Workflow against a real HTTP server speaking the handover protocol

mod support;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, StreamExt};
use hikitsugi::api::{ApiError, BackendApi, HttpBackend};
use hikitsugi::controllers::UploadRequest;
use hikitsugi::events::{EventTransport, HttpEventTransport, RetryPolicy, TransportError};
use hikitsugi::notice::WorkflowNotice;
use hikitsugi::session::{Phase, SessionId};
use hikitsugi::workflow::Workflow;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{recording, AutoAnswer};
use tokio::sync::broadcast;

const SCOPING: &str = "【業務テーマ】\n経費精算の承認\n\n【対象者】\n経理部の新任担当者\n\n【解析方針案】\n- 差し戻し時の対応\n- 承認ルートの確認";

struct FakeServer {
    events: broadcast::Sender<(String, String)>,
    refuse_connects: AtomicUsize,
    connects: AtomicUsize,
    uploads: Mutex<Vec<String>>,
    policies: Mutex<Vec<Value>>,
}

type Shared = Arc<FakeServer>;

fn frame(name: &str, data: &str) -> Result<SseEvent, Infallible> {
    Ok(SseEvent::default().event(name).data(data))
}

async fn events(State(server): State<Shared>, Path(_session_id): Path<String>) -> Response {
    server.connects.fetch_add(1, Ordering::SeqCst);
    let refused = server
        .refuse_connects
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if refused {
        return (StatusCode::SERVICE_UNAVAILABLE, "starting up").into_response();
    }

    let live = server.events.subscribe();
    let initial = stream::iter(vec![
        frame("phase", r#"{"phase":"processing"}"#),
        frame("progress", r#"{"step":"文字起こし","progress":55}"#),
        frame("phase", r#"{"phase":"questioning"}"#),
        frame("scoping", &json!({ "result": SCOPING }).to_string()),
    ]);
    let live = stream::unfold(live, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok((name, data)) => return Some((frame(&name, &data), rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(initial.chain(live)).into_response()
}

async fn upload(State(server): State<Shared>, body: Bytes) -> Json<Value> {
    server
        .uploads
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&body).into_owned());
    Json(json!({ "status": "processing", "message": "アップロードを受け付けました" }))
}

async fn policy(State(server): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    server.policies.lock().unwrap().push(body);
    Json(json!({ "status": "ok" }))
}

async fn analyze(State(server): State<Shared>, Path(_session_id): Path<String>) -> Json<Value> {
    for (name, data) in [
        ("phase", r#"{"phase":"analyzing"}"#),
        ("phase", r#"{"phase":"complete"}"#),
        ("done", r#"{"phase":"complete"}"#),
    ] {
        let _ = server.events.send((name.to_string(), data.to_string()));
    }
    Json(json!({ "status": "started" }))
}

async fn analysis(Path(_session_id): Path<String>) -> Json<Value> {
    Json(json!({
        "phase": "complete",
        "scoping_result": SCOPING,
        "video_analysis": "1. 経費精算システムを開く\n2. 申請を承認する",
    }))
}

async fn generate_document(Json(body): Json<Value>) -> Response {
    if body["session_id"].as_str().unwrap_or_default().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": "session_id is required" })),
        )
            .into_response();
    }
    Json(json!({ "status": "success", "document": "# 経費精算 引継ぎ資料\n\n## 手順" }))
        .into_response()
}

async fn status(Path(session_id): Path<String>) -> Response {
    if session_id == "unknown" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Session not found" })),
        )
            .into_response();
    }
    Json(json!({ "phase": "complete", "filename": "recording.mp4", "user_policy": "[business_type]\n経費精算" }))
        .into_response()
}

async fn document(Path(_session_id): Path<String>) -> Json<Value> {
    Json(json!({ "document": "# 経費精算 引継ぎ資料", "video_analysis": "..." }))
}

async fn start_server(refuse_connects: usize) -> (String, Shared) {
    let (events_tx, _) = broadcast::channel(16);
    let server = Arc::new(FakeServer {
        events: events_tx,
        refuse_connects: AtomicUsize::new(refuse_connects),
        connects: AtomicUsize::new(0),
        uploads: Mutex::new(Vec::new()),
        policies: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/api/events/:session_id", get(events))
        .route("/api/upload", post(upload))
        .route("/api/policy", post(policy))
        .route("/api/analyze/:session_id", post(analyze))
        .route("/api/analysis/:session_id", get(analysis))
        .route("/api/generate-document", post(generate_document))
        .route("/api/status/:session_id", get(status))
        .route("/api/document/:session_id", get(document))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), server)
}

fn backend(url: &str) -> HttpBackend {
    HttpBackend::new(url, Duration::from_secs(5), Duration::from_secs(30)).unwrap()
}

#[tokio::test]
async fn test_full_workflow_over_http() {
    let (url, server) = start_server(1).await;
    let transport = Arc::new(HttpEventTransport::new(&url, Duration::from_secs(5)).unwrap());
    let policy = RetryPolicy::new(Duration::from_millis(20), Duration::from_millis(200), 3);

    let workflow = Workflow::new(
        Arc::new(backend(&url)),
        transport,
        SessionId::new("http-run").unwrap(),
        policy,
    );
    let handler = Arc::new(AutoAnswer::new(
        workflow.input_sender(),
        &["経費精算", "", "2", "操作手順まで詳細に"],
    ));
    let mut workflow = workflow.with_notice_handler(handler.clone());

    let file = recording();
    let request = UploadRequest::new(file.path())
        .with_title("経費精算")
        .with_author("田中")
        .with_notes("月末のみ発生");
    tokio::time::timeout(Duration::from_secs(10), workflow.run(request))
        .await
        .expect("workflow timed out")
        .unwrap();
    workflow.shutdown().await;

    let ctx = workflow.context();
    assert_eq!(ctx.phase(), Phase::Complete);
    assert_eq!(
        ctx.generated_document(),
        Some("# 経費精算 引継ぎ資料\n\n## 手順")
    );
    assert!(ctx.video_analysis().unwrap().starts_with("1. 経費精算システム"));
    assert_eq!(
        handler.count(|n| matches!(n, WorkflowNotice::Progress { percent: 55, .. })),
        1
    );
    // First connect refused, second one carried the session to the end
    assert_eq!(server.connects.load(Ordering::SeqCst), 2);

    let uploads = server.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    for field in ["file", "session_id", "business_title", "author_name", "additional_notes"] {
        assert!(uploads[0].contains(&format!("name=\"{}\"", field)), "missing {}", field);
    }
    assert!(uploads[0].contains("fake recording"));
    assert!(uploads[0].contains("http-run"));
    assert!(uploads[0].to_lowercase().contains("content-type: video/mp4"));

    let policies = server.policies.lock().unwrap().clone();
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0]["session_id"], "http-run");
    assert_eq!(
        policies[0]["policy"],
        "[business_type]\n経費精算\n\n[focus_points]\n\n\n[handover_target]\n他部署からの異動者\n\n[detail_level]\n操作手順まで詳細に"
    );
}

#[tokio::test]
async fn test_error_detail_becomes_message() {
    let (url, _server) = start_server(0).await;
    let backend = backend(&url);

    let status = backend
        .fetch_status(&SessionId::new("known").unwrap())
        .await
        .unwrap();
    assert_eq!(status.phase, "complete");
    assert_eq!(status.filename.as_deref(), Some("recording.mp4"));

    let err = backend
        .fetch_status(&SessionId::new("unknown").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 404, .. }));
    assert_eq!(err.user_message(), "Session not found");

    let stored = backend
        .fetch_document(&SessionId::new("known").unwrap())
        .await
        .unwrap();
    assert_eq!(stored.document.as_deref(), Some("# 経費精算 引継ぎ資料"));
}

#[tokio::test]
async fn test_event_transport_reports_refused_stream() {
    let (url, _server) = start_server(1).await;
    let transport = HttpEventTransport::new(&url, Duration::from_secs(5)).unwrap();
    let session = SessionId::new("sse").unwrap();

    let err = match transport.connect(&session).await {
        Ok(_) => panic!("first connect should be refused"),
        Err(e) => e,
    };
    assert_eq!(err, TransportError::Status { status: 503 });

    let mut connection = transport.connect(&session).await.unwrap();
    let first = connection.next().await.unwrap().unwrap();
    assert_eq!(
        first,
        hikitsugi::events::Event::Phase {
            phase: "processing".to_string()
        }
    );
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    // Bind and drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = backend(&url)
        .fetch_status(&SessionId::new("any").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Network { .. }));
    assert!(err.help_message().contains("HIKITSUGI_SERVER_URL"));
}
