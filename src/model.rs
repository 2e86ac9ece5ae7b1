use crate::error::JobError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub base_url: String,
    pub session_id: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub animation: AnimationMode,
    pub phases: Vec<PhaseScript>,
    pub render_mode: RenderMode,
    pub user_agent: String,
}

impl RunConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), JobError> {
        reqwest::Url::parse(&self.base_url)
            .map_err(|e| JobError::Config(format!("base URL {:?}: {e}", self.base_url)))?;
        if self.poll_interval.is_zero() {
            return Err(JobError::Config("poll interval must be positive".into()));
        }
        if self.retry.base_delay.is_zero() || self.retry.max_delay < self.retry.base_delay {
            return Err(JobError::Config(
                "retry delays must be positive and max >= base".into(),
            ));
        }
        for script in &self.phases {
            script.validate()?;
        }
        Ok(())
    }
}

/// Bounded exponential backoff applied to transient poll failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Consecutive failed polls tolerated before the session fails. Zero fails on the first error.
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
        }
    }
}

/// The form payload posted to the job-creation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// Raw field value, newline- or comma-separated, sent exactly as typed.
    pub links: String,
}

impl SubmissionRequest {
    pub fn new(links: impl Into<String>) -> Self {
        Self {
            links: links.into(),
        }
    }

    /// Split on newlines or commas, trim, and drop empty entries.
    pub fn parsed_links(&self) -> Vec<&str> {
        self.links
            .split(['\n', ','])
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<usize, JobError> {
        match self.parsed_links().len() {
            0 => Err(JobError::Validation(
                "enter at least one strategy link".into(),
            )),
            n => Ok(n),
        }
    }

    /// Form fields in submission order.
    pub fn form_fields(&self) -> [(&'static str, &str); 1] {
        [("links", self.links.as_str())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    #[serde(other)]
    Error,
}

/// One link's outcome within a job, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub strategy_number: u32,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtest_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Typed view over a [`JobResult`] for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOutcome<'a> {
    Success {
        strategy: &'a str,
        backtest: &'a str,
        strategy_file: Option<&'a str>,
        backtest_file: Option<&'a str>,
    },
    Error {
        message: &'a str,
    },
}

impl JobResult {
    pub fn outcome(&self) -> ResultOutcome<'_> {
        match self.status {
            ResultStatus::Success => ResultOutcome::Success {
                strategy: self.strategy.as_deref().unwrap_or(""),
                backtest: self.backtest.as_deref().unwrap_or(""),
                strategy_file: self.strategy_file.as_deref(),
                backtest_file: self.backtest_file.as_deref(),
            },
            ResultStatus::Error => ResultOutcome::Error {
                message: self
                    .error
                    .as_deref()
                    .or(self.message.as_deref())
                    .unwrap_or("Unknown error"),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// Generated file types the backend serves under `/download/<kind>/<filename>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Strategy,
    Backtest,
}

impl ArtifactKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            ArtifactKind::Strategy => "strategy",
            ArtifactKind::Backtest => "backtest",
        }
    }

    /// Server-relative download link, built from the filename as supplied.
    pub fn link_path(self, filename: &str) -> String {
        format!("/download/{}/{}", self.path_segment(), filename)
    }
}

/// Reply to `POST /analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AnalyzeResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Reply to `GET /results`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollResponse {
    pub status: String,
    /// Absent when the backend has nothing new to show; the board is left as it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<JobResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
    /// Older backends spell the completion flag `complete`.
    #[serde(default, skip_serializing)]
    pub complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PollResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    pub fn completed(&self) -> bool {
        self.is_complete.or(self.complete).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Research,
    Backtest,
    Debug,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Research, Phase::Backtest, Phase::Debug];

    pub fn label(self) -> &'static str {
        match self {
            Phase::Research => "Research",
            Phase::Backtest => "Backtest",
            Phase::Debug => "Debug",
        }
    }

    pub fn default_duration(self) -> Duration {
        match self {
            Phase::Research => Duration::from_secs(14),
            Phase::Backtest => Duration::from_secs(17),
            Phase::Debug => Duration::from_secs(12),
        }
    }

    pub fn default_messages(self) -> &'static [&'static str] {
        match self {
            Phase::Research => &[
                "Reading through strategy documentation...",
                "Analyzing mathematical patterns...",
                "Identifying key trading signals...",
                "Processing historical data...",
                "Defining entry and exit rules...",
            ],
            Phase::Backtest => &[
                "Setting up backtesting environment...",
                "Implementing trading logic...",
                "Adding risk management rules...",
                "Configuring position sizing...",
                "Fine-tuning parameters...",
            ],
            Phase::Debug => &[
                "Hunting for bugs...",
                "Optimizing code performance...",
                "Reviewing edge cases...",
                "Running test scenarios...",
                "Finalizing implementation...",
            ],
        }
    }
}

/// Flavour text cycled on the status line while a session is busy.
pub const FUN_MESSAGES: &[&str] = &[
    "AI agents are cooking up some alpha...",
    "The agents are working their magic...",
    "Preparing for launch to the moon...",
    "Discovering hidden patterns in the market...",
    "Optimizing strategy parameters...",
    "Predicting the future (just kidding)...",
    "Adding some artistic flair to the code...",
    "Playing 4D chess with the market...",
    "Finding the end of the rainbow...",
    "Rolling the perfect strategy...",
];

/// A phase's fixed message list and the total time it is stretched over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseScript {
    pub phase: Phase,
    pub messages: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl PhaseScript {
    pub fn new(phase: Phase, messages: Vec<String>, duration: Duration) -> Result<Self, JobError> {
        let script = Self {
            phase,
            messages,
            duration,
        };
        script.validate()?;
        Ok(script)
    }

    pub fn with_defaults(phase: Phase, duration: Duration) -> Self {
        Self {
            phase,
            messages: phase
                .default_messages()
                .iter()
                .map(|m| m.to_string())
                .collect(),
            duration,
        }
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.messages.is_empty() {
            return Err(JobError::Config(format!(
                "{} phase has no messages",
                self.phase.label()
            )));
        }
        Ok(())
    }

    /// Delay before each message: `duration / N`.
    pub fn message_interval(&self) -> Duration {
        // An unvalidated empty script would divide by zero.
        self.duration / (self.messages.len().max(1) as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    Pending,
    Active,
    Complete,
    Error,
}

/// Lifecycle of one submission. Results are applied only while `Polling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Submitting,
    Polling,
    Done,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::Failed | SessionState::Cancelled
        )
    }

    /// True while the session shows a busy indicator.
    pub fn is_busy(self) -> bool {
        matches!(self, SessionState::Submitting | SessionState::Polling)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Submitting) => true,
            (Submitting, Polling) | (Submitting, Failed) | (Submitting, Cancelled) => true,
            (Polling, Done) | (Polling, Failed) | (Polling, Cancelled) => true,
            _ => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Submitting => "Submitting",
            SessionState::Polling => "Polling",
            SessionState::Done => "Done",
            SessionState::Failed => "Failed",
            SessionState::Cancelled => "Cancelled",
        }
    }
}

/// When the cosmetic animation runs relative to the real request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnimationMode {
    /// Play every phase first, then submit.
    Before,
    /// Submit first, then animate while polling.
    Concurrent,
    Off,
}

/// How each poll snapshot is applied to the results board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Rebuild the board from the latest snapshot.
    Replace,
    /// Update entries in place by strategy number, append new ones.
    Upsert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    StateChanged {
        state: SessionState,
    },
    PhaseStarted {
        phase: Phase,
    },
    PhaseMessage {
        phase: Phase,
        message: String,
    },
    PhaseCompleted {
        phase: Phase,
    },
    Submitted {
        link_count: usize,
    },
    PollIssued {
        seq: u64,
    },
    /// `results` is the board after the snapshot was applied.
    ResultsUpdated {
        seq: u64,
        results: Vec<JobResult>,
        complete: bool,
    },
    PollDiscarded {
        seq: u64,
        reason: DiscardReason,
    },
    PollRetry {
        attempt: u32,
        max_retries: u32,
        #[serde(with = "humantime_serde")]
        delay: Duration,
        error: String,
    },
    Info(String),
    SessionFinished {
        // Boxed to keep the enum small.
        summary: Box<SessionSummary>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscardReason {
    /// A newer response was already applied.
    Stale,
    /// The session left `Polling` before the response arrived.
    NotPolling,
}

/// Persisted record of one finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(default)]
    pub timestamp_utc: String,
    pub base_url: String,
    pub session_id: String,
    pub links: String,
    pub link_count: usize,
    pub state: SessionState,
    pub results: Vec<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub polls_issued: u64,
    #[serde(default)]
    pub polls_applied: u64,
    #[serde(default)]
    pub polls_discarded: u64,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl SessionSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}
