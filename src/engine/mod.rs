mod animator;
pub mod client;
mod poller;
mod retry;
#[cfg(test)]
pub(crate) mod testing;

use crate::error::JobError;
use crate::model::{
    AnimationMode, JobEvent, RunConfig, SessionState, SessionSummary, SubmissionRequest,
};
use client::{HttpJobClient, JobApi};
use poller::{PollStats, ResultPoller};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub enum EngineControl {
    /// Abandon the session; in-flight requests are dropped.
    Cancel,
}

/// Drives one submission through submit → animate → poll.
pub struct JobEngine {
    cfg: RunConfig,
    submission: SubmissionRequest,
    api: Arc<dyn JobApi>,
}

impl JobEngine {
    pub fn new(cfg: RunConfig, submission: SubmissionRequest) -> Result<Self, JobError> {
        let api: Arc<dyn JobApi> = Arc::new(HttpJobClient::new(&cfg)?);
        Ok(Self::with_api(cfg, submission, api))
    }

    pub fn with_api(cfg: RunConfig, submission: SubmissionRequest, api: Arc<dyn JobApi>) -> Self {
        Self {
            cfg,
            submission,
            api,
        }
    }

    /// Run the session to a terminal state.
    ///
    /// Backend and transport failures end the session as `Failed` and are reported in
    /// the summary; only invalid configuration or an empty submission return `Err`, and
    /// in that case no request is made.
    pub async fn run(
        self,
        event_tx: mpsc::UnboundedSender<JobEvent>,
        mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> Result<SessionSummary, JobError> {
        self.cfg.validate()?;
        let link_count = self.submission.validate()?;

        let started = Instant::now();
        let mut state = SessionState::Idle;

        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        // Control listener.
        let control_handle = tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                match msg {
                    EngineControl::Cancel => {
                        let _ = cancel_tx.send(true);
                        break;
                    }
                }
            }
        });

        transition(&mut state, SessionState::Submitting, &event_tx);

        if self.cfg.animation == AnimationMode::Before {
            animator::play_all(self.cfg.phases.clone(), event_tx.clone(), cancel_rx.clone()).await;
        }

        let mut error: Option<String> = None;
        let mut stats = PollStats::default();
        let mut results = Vec::new();

        let cancelled_early = *cancel_rx.borrow();
        let submitted = if cancelled_early {
            None
        } else {
            tracing::info!(
                base_url = %self.cfg.base_url,
                session = %self.cfg.session_id,
                links = link_count,
                "submitting"
            );
            tokio::select! {
                res = self.api.submit(&self.submission) => Some(res),
                _ = poller::cancelled(&mut cancel_rx) => None,
            }
        };

        match submitted {
            None => transition(&mut state, SessionState::Cancelled, &event_tx),
            Some(Ok(resp)) if resp.is_success() => {
                let _ = event_tx.send(JobEvent::Submitted { link_count });
                transition(&mut state, SessionState::Polling, &event_tx);

                let animation = (self.cfg.animation == AnimationMode::Concurrent).then(|| {
                    tokio::spawn(animator::play_all(
                        self.cfg.phases.clone(),
                        event_tx.clone(),
                        cancel_rx.clone(),
                    ))
                });

                let poller = ResultPoller::new(
                    self.api.clone(),
                    self.cfg.poll_interval,
                    self.cfg.retry.clone(),
                    self.cfg.render_mode,
                );
                let outcome = poller.run(&event_tx, cancel_rx.clone()).await;

                if let Some(handle) = animation {
                    handle.abort();
                }

                stats = outcome.stats;
                results = outcome.results;
                error = outcome.error;
                transition(&mut state, outcome.state, &event_tx);
            }
            Some(Ok(resp)) => {
                let e = JobError::rejected(resp.message.as_deref());
                tracing::warn!(error = %e, "submission rejected");
                error = Some(e.to_string());
                transition(&mut state, SessionState::Failed, &event_tx);
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "submission failed");
                error = Some(format!("An unexpected error occurred: {e}"));
                transition(&mut state, SessionState::Failed, &event_tx);
            }
        }

        // In Tokio, dropping a JoinHandle does not cancel the task.
        control_handle.abort();

        Ok(SessionSummary {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            base_url: self.cfg.base_url.clone(),
            session_id: self.cfg.session_id.clone(),
            links: self.submission.links.clone(),
            link_count,
            state,
            results,
            error,
            polls_issued: stats.issued,
            polls_applied: stats.applied,
            polls_discarded: stats.discarded,
            retries: stats.retries,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Move to `next` and announce it. Illegal transitions are logged and ignored.
fn transition(
    state: &mut SessionState,
    next: SessionState,
    event_tx: &mpsc::UnboundedSender<JobEvent>,
) {
    if !state.can_transition_to(next) {
        tracing::warn!(from = ?*state, to = ?next, "ignoring illegal session transition");
        return;
    }
    tracing::debug!(from = ?*state, to = ?next, "session state");
    *state = next;
    let _ = event_tx.send(JobEvent::StateChanged { state: next });
}
