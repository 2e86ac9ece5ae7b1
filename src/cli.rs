use crate::engine::client::HttpJobClient;
use crate::engine::{EngineControl, JobEngine};
use crate::model::{
    AnimationMode, JobEvent, Phase, PhaseScript, RenderMode, RetryPolicy, RunConfig,
    SessionState, SessionSummary, SubmissionRequest,
};
use anyhow::{Context, Result};
use clap::Parser;
use rand::RngCore;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "rbi-cli",
    version,
    about = "Submit strategy links to an RBI backend and follow the results, with optional TUI"
)]
pub struct Cli {
    /// Strategy source links (videos, PDFs, articles)
    #[arg(value_name = "LINKS")]
    pub links: Vec<String>,

    /// Links as one text block, separated by newlines or commas
    #[arg(long = "links", value_name = "TEXT")]
    pub links_text: Option<String>,

    /// Read links from a file, or `-` for stdin
    #[arg(long, value_name = "PATH")]
    pub links_file: Option<PathBuf>,

    /// Base URL of the RBI backend
    #[arg(long, env = "RBI_BASE_URL", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Print JSON result and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long)]
    pub silent: bool,

    /// Time between result polls
    #[arg(long, default_value = "5s")]
    pub poll_interval: humantime::Duration,

    /// Retries for a failing poll before the session fails (0 fails on the first error)
    #[arg(long, default_value_t = 3)]
    pub poll_retries: u32,

    /// First backoff delay after a failed poll
    #[arg(long, default_value = "1s")]
    pub retry_base_delay: humantime::Duration,

    /// Upper bound for the backoff delay
    #[arg(long, default_value = "20s")]
    pub retry_max_delay: humantime::Duration,

    /// Per-request timeout
    #[arg(long, default_value = "30s")]
    pub request_timeout: humantime::Duration,

    /// When the phase animation plays relative to the submission
    #[arg(long, value_enum, default_value_t = AnimationMode::Concurrent)]
    pub animation: AnimationMode,

    /// Research phase animation length
    #[arg(long, default_value = "14s")]
    pub research_duration: humantime::Duration,

    /// Backtest phase animation length
    #[arg(long, default_value = "17s")]
    pub backtest_duration: humantime::Duration,

    /// Debug phase animation length
    #[arg(long, default_value = "12s")]
    pub debug_duration: humantime::Duration,

    /// How poll snapshots update the results board
    #[arg(long, value_enum, default_value_t = RenderMode::Replace)]
    pub render_mode: RenderMode,

    /// Download generated strategy and backtest files into this directory
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Export the session as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export the session as an HTML report
    #[arg(long)]
    pub export_html: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Debug-level logging
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    pub fn is_tui(&self) -> bool {
        cfg!(feature = "tui") && !self.silent && !self.json && !self.text
    }
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    // Silent mode takes precedence over other output modes
    if args.silent {
        return run_json(args, true).await;
    }

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_text(args).await;
        }
    }

    if args.json {
        return run_json(args, false).await;
    }

    run_text(args).await
}

/// Generate a random session ID used for logs and history file names.
fn gen_session_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    b.iter().map(|x| format!("{x:02x}")).collect()
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    let durations = [
        (Phase::Research, args.research_duration),
        (Phase::Backtest, args.backtest_duration),
        (Phase::Debug, args.debug_duration),
    ];
    RunConfig {
        base_url: args.base_url.clone(),
        session_id: gen_session_id(),
        poll_interval: Duration::from(args.poll_interval),
        retry: RetryPolicy {
            max_retries: args.poll_retries,
            base_delay: Duration::from(args.retry_base_delay),
            max_delay: Duration::from(args.retry_max_delay),
        },
        request_timeout: Duration::from(args.request_timeout),
        connect_timeout: Duration::from_secs(10),
        animation: args.animation,
        phases: durations
            .into_iter()
            .map(|(phase, d)| PhaseScript::with_defaults(phase, Duration::from(d)))
            .collect(),
        render_mode: args.render_mode,
        user_agent: format!("rbi-cli/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// Gather links from positional arguments, `--links` and `--links-file`, in that order.
///
/// The text is kept raw; splitting and trimming happen only for validation.
pub fn collect_links(args: &Cli) -> Result<String> {
    let mut parts: Vec<String> = args.links.clone();
    if let Some(text) = args.links_text.as_ref() {
        parts.push(text.clone());
    }
    if let Some(path) = args.links_file.as_ref() {
        let text = if path.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read links from stdin")?;
            buf
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("read links file {}", path.display()))?
        };
        parts.push(text);
    }
    Ok(parts.join("\n"))
}

/// Run one session headless, cancelling it on Ctrl-C.
async fn run_session(
    cfg: RunConfig,
    links: String,
    evt_tx: mpsc::UnboundedSender<JobEvent>,
) -> Result<SessionSummary> {
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
    let engine = JobEngine::new(cfg, SubmissionRequest::new(links))?;
    let mut handle = tokio::spawn(async move { engine.run(evt_tx, ctrl_rx).await });

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, cancelling session");
            let _ = ctrl_tx.send(EngineControl::Cancel);
            handle.await
        }
    };
    let summary = joined.context("job engine task failed")??;
    Ok(summary)
}

/// JSON mode; `silent` suppresses everything but errors.
async fn run_json(args: Cli, silent: bool) -> Result<()> {
    let cfg = build_config(&args);
    let links = collect_links(&args)?;
    let (out_tx, out_handle) = if silent {
        (None, None)
    } else {
        let (tx, handle) = spawn_output_writer();
        (Some(tx), Some(handle))
    };

    // Events are not shown in JSON mode; dropping the receiver discards them.
    let (evt_tx, _) = mpsc::unbounded_channel::<JobEvent>();
    let summary = run_session(cfg.clone(), links, evt_tx)
        .await
        .context("RBI session failed")?;

    // Handle exports (errors will propagate)
    handle_exports(&args, &summary)?;
    let download_lines = handle_downloads(&args, &cfg, &summary).await?;

    if let Some(tx) = out_tx.as_ref() {
        let out = serde_json::to_string_pretty(&summary)?;
        let _ = tx.send(OutputLine::Stdout(out));
        for line in download_lines {
            let _ = tx.send(OutputLine::Stderr(line));
        }
    }

    // Save results if auto_save is enabled
    if args.auto_save {
        if silent {
            crate::storage::save_run(&summary).context("failed to save session")?;
        } else if let Some(tx) = out_tx.as_ref() {
            if let Ok(p) = crate::storage::save_run(&summary) {
                let _ = tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
            }
        }
    }

    if let Some(tx) = out_tx {
        drop(tx);
    }
    if let Some(handle) = out_handle {
        let _ = handle.await;
    }

    session_outcome(&summary)
}

async fn run_text(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let links = collect_links(&args)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<JobEvent>();

    let session = tokio::spawn(run_session(cfg.clone(), links, evt_tx));

    while let Some(ev) = evt_rx.recv().await {
        if let Some(line) = event_line(&ev) {
            let _ = out_tx.send(OutputLine::Stderr(line));
        }
    }

    let summary = session.await.context("session task failed")??;

    handle_exports(&args, &summary)?;
    let summary_text = crate::text_summary::build_text_summary(&summary);
    for line in summary_text.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    for line in handle_downloads(&args, &cfg, &summary).await? {
        let _ = out_tx.send(OutputLine::Stderr(line));
    }
    if args.auto_save {
        if let Ok(p) = crate::storage::save_run(&summary) {
            let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;

    session_outcome(&summary)
}

/// Progress line for text mode, if the event is worth showing.
fn event_line(ev: &JobEvent) -> Option<String> {
    match ev {
        JobEvent::StateChanged { state } => Some(format!("[{}]", state.label())),
        JobEvent::PhaseStarted { phase } => Some(format!("== {} ==", phase.label())),
        JobEvent::PhaseMessage { message, .. } => Some(format!("  {message}")),
        JobEvent::PhaseCompleted { phase } => Some(format!("  {} complete", phase.label())),
        JobEvent::Submitted { link_count } => Some(format!("Submitted {link_count} link(s)")),
        JobEvent::ResultsUpdated {
            seq,
            results,
            complete,
        } => Some(format!(
            "Poll #{seq}: {} result(s){}",
            results.len(),
            if *complete { ", complete" } else { "" }
        )),
        JobEvent::PollRetry {
            attempt,
            max_retries,
            delay,
            error,
        } => Some(format!(
            "Poll failed ({error}); retry {attempt}/{max_retries} in {:.1}s",
            delay.as_secs_f64()
        )),
        JobEvent::Info(msg) => Some(msg.clone()),
        JobEvent::PollIssued { .. }
        | JobEvent::PollDiscarded { .. }
        | JobEvent::SessionFinished { .. } => None,
    }
}

fn session_outcome(summary: &SessionSummary) -> Result<()> {
    match summary.state {
        SessionState::Failed => Err(anyhow::anyhow!(
            "{}",
            summary.error.as_deref().unwrap_or("session failed")
        )),
        SessionState::Cancelled => Err(anyhow::anyhow!("session cancelled")),
        _ => Ok(()),
    }
}

/// Handle export operations (JSON and HTML) for both text and JSON modes.
fn handle_exports(args: &Cli, summary: &SessionSummary) -> Result<()> {
    if let Some(p) = args.export_json.as_deref() {
        crate::storage::export_json(p, summary)?;
    }
    if let Some(p) = args.export_html.as_deref() {
        crate::html::export_html(p, summary)?;
    }
    Ok(())
}

/// Download artifacts when `--download-dir` is set; returns one status line per file.
async fn handle_downloads(
    args: &Cli,
    cfg: &RunConfig,
    summary: &SessionSummary,
) -> Result<Vec<String>> {
    let Some(dir) = args.download_dir.as_deref() else {
        return Ok(Vec::new());
    };
    let client = HttpJobClient::new(cfg)?;
    let saved = crate::download::download_all(&client, &summary.results, dir).await;
    Ok(saved
        .into_iter()
        .map(|(name, res)| match res {
            Ok(p) => format!("Downloaded: {}", p.display()),
            Err(e) => format!("Download of {name} failed: {e}"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rbi-cli").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_the_browser_client() {
        let args = parse(&[]);
        let cfg = build_config(&args);
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.animation, AnimationMode::Concurrent);
        assert_eq!(cfg.render_mode, RenderMode::Replace);
        let durations: Vec<_> = cfg.phases.iter().map(|p| p.duration.as_secs()).collect();
        assert_eq!(durations, vec![14, 17, 12]);
        assert!(cfg.phases.iter().all(|p| p.messages.len() == 5));
        assert_eq!(cfg.session_id.len(), 16);
    }

    #[test]
    fn links_sources_are_joined_raw() {
        let args = parse(&["http://a.com", "--links", "http://b.com, http://c.com"]);
        assert_eq!(
            collect_links(&args).unwrap(),
            "http://a.com\nhttp://b.com, http://c.com"
        );
    }

    #[test]
    fn links_file_is_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.txt");
        std::fs::write(&path, "http://a.com\n\nhttp://b.com\n").unwrap();
        let args = parse(&["--links-file", path.to_str().unwrap()]);
        assert_eq!(collect_links(&args).unwrap(), "http://a.com\n\nhttp://b.com\n");
    }

    #[test]
    fn modes_and_durations_parse() {
        let args = parse(&[
            "--animation",
            "before",
            "--render-mode",
            "upsert",
            "--poll-interval",
            "2s",
            "--poll-retries",
            "0",
            "--text",
        ]);
        let cfg = build_config(&args);
        assert_eq!(cfg.animation, AnimationMode::Before);
        assert_eq!(cfg.render_mode, RenderMode::Upsert);
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.retry.max_retries, 0);
        assert!(!args.is_tui());
    }

    #[test]
    fn failed_session_is_an_error_exit() {
        let summary = SessionSummary {
            timestamp_utc: "2026-01-01T00:00:00Z".into(),
            base_url: "http://localhost:8000".into(),
            session_id: "x".into(),
            links: "http://a.com".into(),
            link_count: 1,
            state: SessionState::Failed,
            results: Vec::new(),
            error: Some("backend down".into()),
            polls_issued: 0,
            polls_applied: 0,
            polls_discarded: 0,
            retries: 0,
            elapsed_ms: 0,
        };
        let err = session_outcome(&summary).unwrap_err();
        assert_eq!(err.to_string(), "backend down");
    }
}
