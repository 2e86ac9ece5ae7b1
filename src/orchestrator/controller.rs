//! Session lifecycle controller.
//!
//! Owns submit/cancel/resubmit orchestration and forwards engine events to
//! presentation layers.

use crate::cli::{build_config, Cli};
use crate::engine::client::{HttpJobClient, JobApi};
use crate::engine::{EngineControl, JobEngine};
use crate::error::JobError;
use crate::model::{JobEvent, JobResult, RunConfig, SessionState, SessionSummary, SubmissionRequest};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// Commands emitted by UI layers to control sessions.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Submit the raw links text.
    Submit(String),
    Cancel,
    /// Fetch the artifacts of these results into the download directory.
    Download(Vec<JobResult>),
    Quit,
}

/// Builds engines for new sessions.
pub(crate) struct SessionLauncher {
    make_config: Box<dyn Fn() -> RunConfig + Send + Sync>,
    api: Arc<dyn JobApi>,
}

impl SessionLauncher {
    pub fn new(make_config: Box<dyn Fn() -> RunConfig + Send + Sync>, api: Arc<dyn JobApi>) -> Self {
        Self { make_config, api }
    }

    pub fn from_cli(args: &Cli) -> Result<Self> {
        let api: Arc<dyn JobApi> = Arc::new(HttpJobClient::new(&build_config(args))?);
        let args = args.clone();
        Ok(Self::new(Box::new(move || build_config(&args)), api))
    }

    fn start(&self, links: String, event_tx: UnboundedSender<JobEvent>) -> SessionCtx {
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
        let engine = JobEngine::with_api(
            (self.make_config)(),
            SubmissionRequest::new(links),
            self.api.clone(),
        );
        let handle = tokio::spawn(async move { engine.run(event_tx, ctrl_rx).await });
        SessionCtx {
            ctrl_tx,
            handle: Some(handle),
            state: SessionState::Submitting,
        }
    }
}

/// Internal handle for a running session task.
struct SessionCtx {
    ctrl_tx: UnboundedSender<EngineControl>,
    handle: Option<tokio::task::JoinHandle<Result<SessionSummary, JobError>>>,
    // Last state reported by the engine; a freshly started session counts as submitting.
    state: SessionState,
}

fn info(event_tx: &UnboundedSender<JobEvent>, msg: impl Into<String>) {
    let _ = event_tx.send(JobEvent::Info(msg.into()));
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn spawn_download(
    api: Arc<dyn JobApi>,
    dir: PathBuf,
    results: Vec<JobResult>,
    event_tx: UnboundedSender<JobEvent>,
) {
    tokio::spawn(async move {
        let saved = crate::download::download_all(api.as_ref(), &results, &dir).await;
        if saved.is_empty() {
            info(&event_tx, "Nothing to download");
            return;
        }
        let ok = saved.iter().filter(|(_, r)| r.is_ok()).count();
        let failed: Vec<String> = saved
            .iter()
            .filter_map(|(name, r)| r.as_ref().err().map(|e| format!("{name}: {e}")))
            .collect();
        if failed.is_empty() {
            info(&event_tx, format!("Downloaded {ok} file(s) to {}", dir.display()));
        } else {
            info(
                &event_tx,
                format!("Downloaded {ok} file(s); failed {}", failed.join("; ")),
            );
        }
    });
}

/// Orchestrate sessions based on UI commands and emit events back to presentation layers.
///
/// `download_dir`, when set, receives the artifacts of every session that finishes `Done`.
pub(crate) async fn run_controller(
    launcher: SessionLauncher,
    download_dir: Option<PathBuf>,
    initial_links: Option<String>,
    event_tx: UnboundedSender<JobEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    // Engine events pass through here so the controller sees the session state.
    let (engine_tx, mut engine_rx) = mpsc::unbounded_channel::<JobEvent>();

    let mut session = initial_links.map(|links| launcher.start(links, engine_tx.clone()));
    let mut pending_links: Option<String> = None;
    let mut quit_pending = false;
    // Cancel watchdog: if a cancel takes too long, emit a status message to keep UI feedback alive.
    let mut cancel_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Submit(links)) => match &session {
                        None => {
                            session = Some(launcher.start(links, engine_tx.clone()));
                        }
                        Some(ctx) if ctx.state == SessionState::Submitting => {
                            tracing::info!("submit ignored, a submission is in flight");
                            info(&event_tx, "Submission already in progress");
                        }
                        Some(ctx) => {
                            // Restart is serialized: cancel the active session first, then start
                            // the new one once we observe completion.
                            pending_links = Some(links);
                            let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
                            info(&event_tx, "Cancelling…");
                            cancel_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                        }
                    },
                    Some(UiCommand::Cancel) => {
                        if let Some(ctx) = &session {
                            pending_links = None;
                            let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
                            info(&event_tx, "Cancelling…");
                            cancel_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                        }
                    }
                    Some(UiCommand::Download(results)) => {
                        let dir = download_dir.clone().unwrap_or_else(default_download_dir);
                        spawn_download(launcher.api.clone(), dir, results, event_tx.clone());
                    }
                    Some(UiCommand::Quit) | None => {
                        // Quit waits for the current session to finish so we can cleanly finalize UI state.
                        quit_pending = true;
                        pending_links = None;
                        if let Some(ctx) = &session {
                            let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
                            cancel_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                        } else {
                            break;
                        }
                    }
                }
            }
            Some(ev) = engine_rx.recv() => {
                if let (JobEvent::StateChanged { state }, Some(ctx)) = (&ev, session.as_mut()) {
                    ctx.state = *state;
                }
                let _ = event_tx.send(ev);
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(ctx) = &mut session {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    // Everything the engine sent precedes its summary.
                    while let Ok(ev) = engine_rx.try_recv() {
                        let _ = event_tx.send(ev);
                    }
                    match join_res {
                        Ok(Ok(summary)) => {
                            if summary.state == SessionState::Done && !quit_pending {
                                if let Some(dir) = download_dir.clone() {
                                    spawn_download(
                                        launcher.api.clone(),
                                        dir,
                                        summary.results.clone(),
                                        event_tx.clone(),
                                    );
                                }
                            }
                            let _ = event_tx.send(JobEvent::SessionFinished { summary: Box::new(summary) });
                        }
                        Ok(Err(e)) => {
                            info(&event_tx, format!("Not submitted: {e}"));
                        }
                        Err(e) => {
                            info(&event_tx, format!("Session join failed: {e}"));
                        }
                    }
                    session = None;
                    cancel_deadline = None;
                    if quit_pending {
                        break;
                    }
                    if let Some(links) = pending_links.take() {
                        session = Some(launcher.start(links, engine_tx.clone()));
                    }
                }
            }
            // If cancel stalls (e.g., network op in flight), keep the user informed.
            _ = watchdog.tick() => {
                if let Some(deadline) = cancel_deadline {
                    if tokio::time::Instant::now() >= deadline && session.is_some() {
                        info(&event_tx, "Still cancelling…");
                        cancel_deadline = None;
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::ScriptedApi;
    use crate::model::{AnalyzeResponse, AnimationMode, Phase, PhaseScript, RenderMode, RetryPolicy};

    fn test_config() -> RunConfig {
        RunConfig {
            base_url: "http://localhost:8000".into(),
            session_id: "ctl".into(),
            poll_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            animation: AnimationMode::Off,
            phases: Phase::ALL
                .into_iter()
                .map(|p| PhaseScript::with_defaults(p, Duration::from_secs(1)))
                .collect(),
            render_mode: RenderMode::Replace,
            user_agent: "rbi-cli/test".into(),
        }
    }

    fn launcher(api: Arc<ScriptedApi>) -> SessionLauncher {
        SessionLauncher::new(Box::new(test_config), api)
    }

    fn finished_states(events: &[JobEvent]) -> Vec<SessionState> {
        events
            .iter()
            .filter_map(|e| match e {
                JobEvent::SessionFinished { summary } => Some(summary.state),
                _ => None,
            })
            .collect()
    }

    fn drain(rx: &mut UnboundedReceiver<JobEvent>) -> Vec<JobEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn submit_while_submitting_is_rejected() {
        let slow_submit = (
            Duration::from_secs(10),
            Ok(AnalyzeResponse {
                status: "success".into(),
                message: None,
            }),
        );
        let api = Arc::new(ScriptedApi::new(vec![slow_submit], Vec::new()));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(launcher(api.clone()), None, None, event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Submit("http://a.com".into())).unwrap();
        cmd_tx.send(UiCommand::Submit("http://b.com".into())).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let events = drain(&mut event_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, JobEvent::Info(m) if m == "Submission already in progress")));

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
        assert_eq!(api.submit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_while_polling_restarts_after_cancel() {
        let api = Arc::new(ScriptedApi::with_polls(Vec::new()));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(
            launcher(api.clone()),
            None,
            Some("http://a.com".into()),
            event_tx,
            cmd_rx,
        ));

        tokio::time::sleep(Duration::from_secs(6)).await;
        cmd_tx.send(UiCommand::Submit("http://b.com".into())).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let events = drain(&mut event_rx);
        assert_eq!(finished_states(&events), vec![SessionState::Cancelled]);
        let submitted: Vec<_> = api.submitted().into_iter().map(|s| s.links).collect();
        assert_eq!(submitted, vec!["http://a.com", "http://b.com"]);

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
        assert_eq!(
            finished_states(&drain(&mut event_rx)),
            vec![SessionState::Cancelled]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_submission_reports_without_request() {
        let api = Arc::new(ScriptedApi::with_polls(Vec::new()));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(launcher(api.clone()), None, None, event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Submit(" \n, ".into())).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();

        let events = drain(&mut event_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, JobEvent::Info(m) if m.starts_with("Not submitted"))));
        assert_eq!(api.submit_count(), 0);
    }
}
