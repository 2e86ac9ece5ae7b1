//! HTTP access to the job backend.
//!
//! The engine talks to the backend through [`JobApi`] so that sessions can be driven
//! against a scripted backend in tests.

use crate::error::{is_retryable_status, JobError};
use crate::model::{AnalyzeResponse, ArtifactKind, PollResponse, RunConfig, SubmissionRequest};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use serde::de::DeserializeOwned;

#[async_trait]
pub trait JobApi: Send + Sync {
    /// `POST /analyze` with the form fields of `req`.
    async fn submit(&self, req: &SubmissionRequest) -> Result<AnalyzeResponse, JobError>;

    /// `GET /results`.
    async fn fetch_results(&self) -> Result<PollResponse, JobError>;

    /// `GET /download/<kind>/<filename>`.
    async fn download(&self, kind: ArtifactKind, filename: &str) -> Result<Bytes, JobError>;
}

pub struct HttpJobClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpJobClient {
    pub fn new(cfg: &RunConfig) -> Result<Self, JobError> {
        let base_url = Url::parse(&cfg.base_url)
            .map_err(|e| JobError::Config(format!("base URL {:?}: {e}", cfg.base_url)))?;
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.connect_timeout)
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| JobError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { http, base_url })
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, JobError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                JobError::Config(format!("base URL {} cannot carry a path", self.base_url))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(
        url: &Url,
        resp: reqwest::Response,
    ) -> Result<T, JobError> {
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| JobError::from_reqwest(url.as_str(), e))?;

        if !status.is_success() {
            // Some backends explain the failure in a JSON body; prefer that text.
            let message = serde_json::from_slice::<AnalyzeResponse>(&body)
                .ok()
                .and_then(|r| r.message);
            return Err(match message {
                Some(m) if !m.trim().is_empty() && !is_retryable_status(status.as_u16()) => {
                    JobError::rejected(Some(&m))
                }
                _ => JobError::Http {
                    status: status.as_u16(),
                    url: url.to_string(),
                },
            });
        }

        serde_json::from_slice::<T>(&body).map_err(|e| JobError::Decode {
            url: url.to_string(),
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl JobApi for HttpJobClient {
    async fn submit(&self, req: &SubmissionRequest) -> Result<AnalyzeResponse, JobError> {
        let url = self.endpoint(&["analyze"])?;
        tracing::debug!(url = %url, links = req.parsed_links().len(), "submitting job");
        let resp = self
            .http
            .post(url.clone())
            .form(&req.form_fields())
            .send()
            .await
            .map_err(|e| JobError::from_reqwest(url.as_str(), e))?;
        Self::read_json(&url, resp).await
    }

    async fn fetch_results(&self) -> Result<PollResponse, JobError> {
        let url = self.endpoint(&["results"])?;
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| JobError::from_reqwest(url.as_str(), e))?;
        Self::read_json(&url, resp).await
    }

    async fn download(&self, kind: ArtifactKind, filename: &str) -> Result<Bytes, JobError> {
        let url = self.endpoint(&["download", kind.path_segment(), filename])?;
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| JobError::from_reqwest(url.as_str(), e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(JobError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        // The backend answers a missing file with 200 and a JSON error envelope.
        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        let body = resp
            .bytes()
            .await
            .map_err(|e| JobError::from_reqwest(url.as_str(), e))?;
        if is_json {
            if let Ok(envelope) = serde_json::from_slice::<AnalyzeResponse>(&body) {
                if !envelope.is_success() {
                    return Err(JobError::rejected(envelope.message.as_deref()));
                }
            }
        }
        Ok(body)
    }
}
