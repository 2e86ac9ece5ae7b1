//! Client-side view state: the results board and per-phase progress.
//!
//! Both are pure reducers over [`JobEvent`]s so every presentation layer (TUI, text,
//! JSON) draws from the same state.

use crate::model::{JobEvent, JobResult, Phase, PhaseStatus, RenderMode, SessionState};

/// Rendered results for the current session.
#[derive(Debug, Clone)]
pub struct ResultBoard {
    mode: RenderMode,
    results: Vec<JobResult>,
    error: Option<String>,
    complete: bool,
}

impl ResultBoard {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            results: Vec::new(),
            error: None,
            complete: false,
        }
    }

    pub fn results(&self) -> &[JobResult] {
        &self.results
    }

    /// The single session-level error block, if the session failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.error = None;
        self.complete = false;
    }

    pub fn apply_snapshot(&mut self, snapshot: &[JobResult], complete: bool) {
        match self.mode {
            RenderMode::Replace => {
                self.results = snapshot.to_vec();
            }
            RenderMode::Upsert => {
                for r in snapshot {
                    match self
                        .results
                        .iter_mut()
                        .find(|existing| existing.strategy_number == r.strategy_number)
                    {
                        Some(existing) => *existing = r.clone(),
                        None => self.results.push(r.clone()),
                    }
                }
            }
        }
        self.set_complete(complete);
    }

    pub fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }

    /// Replace any previous error block; a board shows at most one.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }
}

/// Status of each cosmetic phase.
#[derive(Debug, Clone)]
pub struct PhaseProgress {
    statuses: [PhaseStatus; 3],
    messages: [Vec<String>; 3],
}

impl Default for PhaseProgress {
    fn default() -> Self {
        Self {
            statuses: [PhaseStatus::Pending; 3],
            messages: Default::default(),
        }
    }
}

fn index(phase: Phase) -> usize {
    match phase {
        Phase::Research => 0,
        Phase::Backtest => 1,
        Phase::Debug => 2,
    }
}

impl PhaseProgress {
    pub fn status(&self, phase: Phase) -> PhaseStatus {
        self.statuses[index(phase)]
    }

    pub fn messages(&self, phase: Phase) -> &[String] {
        &self.messages[index(phase)]
    }

    pub fn active(&self) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|p| self.status(*p) == PhaseStatus::Active)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Marking one phase active deactivates any other active phase.
    pub fn start(&mut self, phase: Phase) {
        for s in self.statuses.iter_mut() {
            if *s == PhaseStatus::Active {
                *s = PhaseStatus::Complete;
            }
        }
        self.statuses[index(phase)] = PhaseStatus::Active;
        self.messages[index(phase)].clear();
    }

    pub fn push_message(&mut self, phase: Phase, message: String) {
        self.messages[index(phase)].push(message);
    }

    pub fn complete(&mut self, phase: Phase) {
        self.statuses[index(phase)] = PhaseStatus::Complete;
    }

    /// Resolve the phase still on screen once the session has ended: complete on
    /// success, error on failure, back to pending when cancelled.
    pub fn settle(&mut self, outcome: SessionState) {
        let to = match outcome {
            SessionState::Done => PhaseStatus::Complete,
            SessionState::Failed => PhaseStatus::Error,
            _ => PhaseStatus::Pending,
        };
        for s in self.statuses.iter_mut() {
            if *s == PhaseStatus::Active {
                *s = to;
            }
        }
    }
}

/// Board, phases and state folded together from the engine's event stream.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub state: SessionState,
    pub board: ResultBoard,
    pub phases: PhaseProgress,
    pub last_seq: u64,
    pub info: String,
}

impl SessionView {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            state: SessionState::Idle,
            board: ResultBoard::new(mode),
            phases: PhaseProgress::default(),
            last_seq: 0,
            info: String::new(),
        }
    }

    /// Clear results and phase markers ahead of a new submission.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.board.clear();
        self.phases.reset();
        self.last_seq = 0;
        self.info.clear();
    }

    pub fn apply(&mut self, ev: &JobEvent) {
        match ev {
            JobEvent::StateChanged { state } => {
                if *state == SessionState::Submitting {
                    self.reset();
                }
                if state.is_terminal() {
                    self.phases.settle(*state);
                }
                self.state = *state;
            }
            JobEvent::PhaseStarted { phase } => self.phases.start(*phase),
            JobEvent::PhaseMessage { phase, message } => {
                self.phases.push_message(*phase, message.clone())
            }
            JobEvent::PhaseCompleted { phase } => self.phases.complete(*phase),
            JobEvent::Submitted { link_count } => {
                self.info = format!("Submitted {link_count} link(s)");
            }
            JobEvent::PollIssued { .. } => {}
            JobEvent::ResultsUpdated {
                seq,
                results,
                complete,
            } => {
                self.last_seq = *seq;
                self.board.apply_snapshot(results, *complete);
            }
            JobEvent::PollDiscarded { .. } => {}
            JobEvent::PollRetry {
                attempt,
                max_retries,
                delay,
                error,
            } => {
                self.info = format!(
                    "Poll failed ({error}); retry {attempt}/{max_retries} in {}",
                    humantime::format_duration(round_to_millis(*delay))
                );
            }
            JobEvent::Info(msg) => self.info = msg.clone(),
            JobEvent::SessionFinished { summary } => {
                self.state = summary.state;
                self.phases.settle(summary.state);
                if let Some(err) = summary.error.as_deref() {
                    self.board.set_error(err);
                }
            }
        }
    }
}

fn round_to_millis(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}
