//! Result poller: fetches `/results` on a fixed interval until the backend reports
//! completion, the session fails, or it is cancelled.
//!
//! Ticks do not wait for the previous fetch, so slow round trips can overlap. Every
//! fetch carries a sequence number and a response is applied only while the session is
//! still polling and only if it is newer than the last applied one.

use crate::board::ResultBoard;
use crate::engine::client::JobApi;
use crate::engine::retry::Backoff;
use crate::error::JobError;
use crate::model::{
    DiscardReason, JobEvent, JobResult, PollResponse, RenderMode, RetryPolicy, SessionState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PollStats {
    pub issued: u64,
    pub applied: u64,
    pub discarded: u64,
    pub retries: u32,
}

#[derive(Debug)]
pub(crate) struct PollOutcome {
    pub state: SessionState,
    pub results: Vec<JobResult>,
    pub error: Option<String>,
    pub stats: PollStats,
}

/// What the loop should do after a response has been applied.
#[derive(Debug, PartialEq)]
enum Step {
    Continue,
    Retry(Duration),
    Finished,
}

/// Mutable state of one polling session.
struct PollSession<'a> {
    state: SessionState,
    last_applied: u64,
    board: ResultBoard,
    backoff: Backoff,
    stats: PollStats,
    error: Option<String>,
    event_tx: &'a mpsc::UnboundedSender<JobEvent>,
}

impl<'a> PollSession<'a> {
    fn new(
        mode: RenderMode,
        retry: RetryPolicy,
        event_tx: &'a mpsc::UnboundedSender<JobEvent>,
    ) -> Self {
        Self {
            state: SessionState::Polling,
            last_applied: 0,
            board: ResultBoard::new(mode),
            backoff: Backoff::new(retry),
            stats: PollStats::default(),
            error: None,
            event_tx,
        }
    }

    fn discard(&mut self, seq: u64, reason: DiscardReason) -> Step {
        tracing::debug!(seq, ?reason, "discarding poll response");
        self.stats.discarded += 1;
        let _ = self.event_tx.send(JobEvent::PollDiscarded { seq, reason });
        Step::Continue
    }

    fn fail(&mut self, message: String) -> Step {
        self.state = SessionState::Failed;
        self.board.set_error(message.clone());
        self.error = Some(message);
        Step::Finished
    }

    fn apply(&mut self, seq: u64, res: Result<PollResponse, JobError>) -> Step {
        if self.state != SessionState::Polling {
            return self.discard(seq, DiscardReason::NotPolling);
        }
        if seq <= self.last_applied {
            return self.discard(seq, DiscardReason::Stale);
        }

        match res {
            Ok(resp) if resp.is_success() => {
                self.last_applied = seq;
                self.backoff.reset();
                self.stats.applied += 1;
                let complete = resp.completed();
                match resp.results {
                    Some(snapshot) => self.board.apply_snapshot(&snapshot, complete),
                    None => self.board.set_complete(complete),
                }
                tracing::debug!(seq, results = self.board.len(), complete, "poll applied");
                let _ = self.event_tx.send(JobEvent::ResultsUpdated {
                    seq,
                    results: self.board.results().to_vec(),
                    complete,
                });
                if complete {
                    self.state = SessionState::Done;
                    Step::Finished
                } else {
                    Step::Continue
                }
            }
            Ok(resp) => {
                self.last_applied = seq;
                let e = JobError::rejected(resp.message.as_deref());
                tracing::warn!(seq, error = %e, "backend reported failure while polling");
                self.fail(e.to_string())
            }
            Err(e) if e.is_transient() => match self.backoff.next_delay() {
                Some(delay) => {
                    self.stats.retries += 1;
                    tracing::warn!(
                        seq,
                        error = %e,
                        attempt = self.backoff.failures(),
                        delay_ms = delay.as_millis() as u64,
                        "poll failed, backing off"
                    );
                    let _ = self.event_tx.send(JobEvent::PollRetry {
                        attempt: self.backoff.failures(),
                        max_retries: self.backoff.max_retries(),
                        delay,
                        error: e.to_string(),
                    });
                    Step::Retry(delay)
                }
                None => {
                    tracing::error!(seq, error = %e, "poll failed, retry budget spent");
                    self.fail(format!("Polling failed: {e}"))
                }
            },
            Err(e) => {
                tracing::error!(seq, error = %e, "poll failed");
                self.fail(format!("Polling failed: {e}"))
            }
        }
    }

    fn into_outcome(self) -> PollOutcome {
        PollOutcome {
            state: self.state,
            results: self.board.results().to_vec(),
            error: self.error,
            stats: self.stats,
        }
    }
}

/// Resolve once cancellation is requested. A dropped sender is not a cancellation.
pub(crate) async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    if cancel_rx.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub(crate) struct ResultPoller {
    api: Arc<dyn JobApi>,
    interval: Duration,
    retry: RetryPolicy,
    mode: RenderMode,
}

impl ResultPoller {
    pub fn new(
        api: Arc<dyn JobApi>,
        interval: Duration,
        retry: RetryPolicy,
        mode: RenderMode,
    ) -> Self {
        Self {
            api,
            interval,
            retry,
            mode,
        }
    }

    /// Poll until a terminal state. The first fetch happens one interval after arming.
    pub async fn run(
        self,
        event_tx: &mpsc::UnboundedSender<JobEvent>,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> PollOutcome {
        let mut session = PollSession::new(self.mode, self.retry.clone(), event_tx);
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut inflight: JoinSet<(u64, Result<PollResponse, JobError>)> = JoinSet::new();
        let mut next_seq = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    next_seq += 1;
                    let seq = next_seq;
                    session.stats.issued += 1;
                    let _ = event_tx.send(JobEvent::PollIssued { seq });
                    let api = self.api.clone();
                    inflight.spawn(async move { (seq, api.fetch_results().await) });
                }
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    let (seq, res) = match joined {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!(error = %e, "poll task ended abnormally");
                            continue;
                        }
                    };
                    match session.apply(seq, res) {
                        Step::Continue => {}
                        Step::Retry(delay) => ticker.reset_after(delay),
                        Step::Finished => break,
                    }
                }
                _ = cancelled(&mut cancel_rx) => {
                    tracing::info!("polling cancelled");
                    session.state = SessionState::Cancelled;
                    break;
                }
            }
        }

        // Stop outstanding fetches; anything that already finished is discarded by the
        // state check.
        inflight.abort_all();
        while let Some(joined) = inflight.join_next().await {
            if let Ok((seq, res)) = joined {
                session.apply(seq, res);
            }
        }

        session.into_outcome()
    }
}
