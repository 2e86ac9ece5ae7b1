//! Scripted in-memory backend for engine tests.

use crate::engine::client::JobApi;
use crate::error::JobError;
use crate::model::{
    AnalyzeResponse, ArtifactKind, JobResult, PollResponse, ResultStatus, SubmissionRequest,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Scripted<T> = Mutex<VecDeque<(Duration, Result<T, JobError>)>>;

pub(crate) struct ScriptedApi {
    submits: Scripted<AnalyzeResponse>,
    polls: Scripted<PollResponse>,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    submitted: Mutex<Vec<SubmissionRequest>>,
}

impl ScriptedApi {
    pub fn new(
        submits: Vec<(Duration, Result<AnalyzeResponse, JobError>)>,
        polls: Vec<(Duration, Result<PollResponse, JobError>)>,
    ) -> Self {
        Self {
            submits: Mutex::new(submits.into()),
            polls: Mutex::new(polls.into()),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Backend whose submit always succeeds.
    pub fn with_polls(polls: Vec<(Duration, Result<PollResponse, JobError>)>) -> Self {
        Self::new(Vec::new(), polls)
    }

    pub fn poll_count(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn submit_count(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<SubmissionRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobApi for ScriptedApi {
    async fn submit(&self, req: &SubmissionRequest) -> Result<AnalyzeResponse, JobError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(req.clone());
        let next = self.submits.lock().unwrap().pop_front();
        match next {
            Some((delay, res)) => {
                tokio::time::sleep(delay).await;
                res
            }
            None => Ok(AnalyzeResponse {
                status: "success".into(),
                message: None,
            }),
        }
    }

    async fn fetch_results(&self) -> Result<PollResponse, JobError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some((delay, res)) => {
                tokio::time::sleep(delay).await;
                res
            }
            None => Ok(incomplete(Vec::new())),
        }
    }

    async fn download(&self, kind: ArtifactKind, filename: &str) -> Result<Bytes, JobError> {
        Ok(Bytes::from(format!("{}:{filename}", kind.path_segment())))
    }
}

pub(crate) fn incomplete(results: Vec<JobResult>) -> PollResponse {
    PollResponse {
        status: "success".into(),
        results: Some(results),
        is_complete: Some(false),
        ..Default::default()
    }
}

pub(crate) fn ok_result(n: u32) -> JobResult {
    JobResult {
        strategy_number: n,
        status: ResultStatus::Success,
        link: Some(format!("http://example.com/{n}")),
        strategy: Some(format!("S{n}")),
        backtest: Some(format!("B{n}")),
        strategy_file: Some(format!("s{n}.py")),
        backtest_file: Some(format!("b{n}.py")),
        error: None,
        message: None,
    }
}
