//! End-to-end sessions against a local mock backend over real HTTP.

use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rbi_cli::download::download_artifact;
use rbi_cli::engine::client::HttpJobClient;
use rbi_cli::engine::{EngineControl, JobEngine};
use rbi_cli::error::{JobError, GENERIC_FAILURE_MESSAGE};
use rbi_cli::model::{
    AnimationMode, ArtifactKind, JobEvent, Phase, PhaseScript, RenderMode, RetryPolicy,
    RunConfig, SessionState, SessionSummary, SubmissionRequest,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[derive(Default)]
struct Backend {
    reject_submit: bool,
    fail_polls: bool,
    posted: Mutex<Vec<String>>,
    polls: AtomicUsize,
}

async fn analyze(
    State(backend): State<Arc<Backend>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    backend
        .posted
        .lock()
        .unwrap()
        .push(form.get("links").cloned().unwrap_or_default());
    if backend.reject_submit {
        Json(json!({ "status": "error" }))
    } else {
        Json(json!({ "status": "success", "message": "Processing started" }))
    }
}

async fn results(State(backend): State<Arc<Backend>>) -> Response {
    let n = backend.polls.fetch_add(1, Ordering::SeqCst) + 1;
    if backend.fail_polls {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let first = json!({
        "strategy_number": 1,
        "status": "success",
        "link": "http://a.com",
        "strategy": "class S: pass",
        "backtest": "run()",
        "strategy_file": "s1.py",
        "backtest_file": "b1.py"
    });
    if n == 1 {
        Json(json!({ "status": "success", "results": [first], "is_complete": false }))
            .into_response()
    } else {
        let second = json!({
            "strategy_number": 2,
            "status": "error",
            "link": "http://b.com",
            "message": "Could not fetch content"
        });
        // Older backends spell the flag `complete`.
        Json(json!({ "status": "success", "results": [first, second], "complete": true }))
            .into_response()
    }
}

async fn download(Path((kind, file)): Path<(String, String)>) -> Response {
    if kind == "strategy" && file == "s1.py" {
        "class S: pass\n".into_response()
    } else {
        Json(json!({ "status": "error", "message": "File not found" })).into_response()
    }
}

async fn serve(backend: Arc<Backend>) -> String {
    let app = Router::new()
        .route("/analyze", post(analyze))
        .route("/results", get(results))
        .route("/download/{kind}/{file}", get(download))
        .with_state(backend);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(base_url: String) -> RunConfig {
    RunConfig {
        base_url,
        session_id: "it".into(),
        poll_interval: Duration::from_millis(50),
        retry: RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        },
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        animation: AnimationMode::Off,
        phases: Phase::ALL
            .into_iter()
            .map(|p| PhaseScript::with_defaults(p, Duration::from_millis(50)))
            .collect(),
        render_mode: RenderMode::Replace,
        user_agent: "rbi-cli/it".into(),
    }
}

async fn run_session(base_url: String, links: &str) -> (SessionSummary, Vec<JobEvent>) {
    let engine = JobEngine::new(config(base_url), SubmissionRequest::new(links)).unwrap();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
    let (_ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
    let summary = tokio::time::timeout(Duration::from_secs(10), engine.run(evt_tx, ctrl_rx))
        .await
        .expect("session timed out")
        .unwrap();
    let mut events = Vec::new();
    while let Ok(ev) = evt_rx.try_recv() {
        events.push(ev);
    }
    (summary, events)
}

#[tokio::test]
async fn session_posts_raw_links_and_polls_until_complete() {
    let backend = Arc::new(Backend::default());
    let base = serve(backend.clone()).await;

    let (summary, events) = run_session(base, "http://a.com\nhttp://b.com").await;

    assert_eq!(
        *backend.posted.lock().unwrap(),
        vec!["http://a.com\nhttp://b.com".to_string()]
    );
    assert_eq!(summary.state, SessionState::Done);
    assert_eq!(summary.link_count, 2);
    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 1);
    assert!(summary.error.is_none());

    // The first snapshot was incomplete and rendered one success block.
    let first = events.iter().find_map(|e| match e {
        JobEvent::ResultsUpdated {
            results, complete, ..
        } => Some((results.len(), *complete)),
        _ => None,
    });
    assert_eq!(first, Some((1, false)));

    // No fetch after the completed snapshot.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.polls.load(Ordering::SeqCst), 2);

    let text = rbi_cli::text_summary::build_text_summary(&summary)
        .lines
        .join("\n");
    assert!(text.contains("/download/strategy/s1.py"));
    assert!(text.contains("/download/backtest/b1.py"));
    assert!(text.contains("Error: Could not fetch content"));
}

#[tokio::test]
async fn rejected_submission_fails_without_polling() {
    let backend = Arc::new(Backend {
        reject_submit: true,
        ..Default::default()
    });
    let base = serve(backend.clone()).await;

    let (summary, _) = run_session(base, "http://a.com").await;

    assert_eq!(summary.state, SessionState::Failed);
    assert_eq!(summary.error.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backend.polls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn poll_failure_without_retries_halts_with_one_error() {
    let backend = Arc::new(Backend {
        fail_polls: true,
        ..Default::default()
    });
    let base = serve(backend.clone()).await;

    let (summary, _) = run_session(base, "http://a.com").await;

    assert_eq!(summary.state, SessionState::Failed);
    assert!(summary
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Polling failed")));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn artifacts_download_and_missing_files_report_the_server_message() {
    let base = serve(Arc::new(Backend::default())).await;
    let client = HttpJobClient::new(&config(base)).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let saved = download_artifact(&client, ArtifactKind::Strategy, "s1.py", dir.path())
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(saved).unwrap(), "class S: pass\n");

    let missing = download_artifact(&client, ArtifactKind::Backtest, "b1.py", dir.path()).await;
    match missing {
        Err(JobError::Rejected { message }) => assert_eq!(message, "File not found"),
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert!(!dir.path().join("b1.py").exists());
}
