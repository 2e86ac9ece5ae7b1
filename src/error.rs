//! Error types for the job client and engine.
//!
//! Presentation and orchestration layers wrap these in `anyhow::Error`; the engine
//! keeps them typed so the poller can tell transient failures from terminal ones.

/// Fallback shown when the backend rejects a request without a message.
pub const GENERIC_FAILURE_MESSAGE: &str = "An unexpected error occurred in the response format";

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The request never produced a response (connect failure, timeout, reset).
    #[error("request to {url} failed: {detail}")]
    Transport { url: String, detail: String },

    /// The server replied with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The body was not the JSON shape we expected.
    #[error("could not decode response from {url}: {detail}")]
    Decode { url: String, detail: String },

    /// The server answered with `status` other than `"success"`.
    #[error("{message}")]
    Rejected { message: String },

    #[error("invalid submission: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("refusing to use server-supplied filename {0:?}")]
    InvalidFilename(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// HTTP statuses that may succeed on a later attempt: server errors, throttling and
/// request timeouts.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429 || status == 408
}

impl JobError {
    /// Build a rejection from an optional server message, using the generic fallback text.
    pub fn rejected(message: Option<&str>) -> Self {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(GENERIC_FAILURE_MESSAGE)
            .to_string();
        JobError::Rejected { message }
    }

    /// Failures worth retrying during polling: the request may succeed on the next attempt.
    ///
    /// A server-reported rejection is a logical failure and ends the session immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            JobError::Transport { .. } | JobError::Decode { .. } => true,
            JobError::Http { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Convert a reqwest error raised while sending or reading a request.
    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_decode() {
            JobError::Decode {
                url: url.to_string(),
                detail: e.to_string(),
            }
        } else if let Some(status) = e.status() {
            JobError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            JobError::Transport {
                url: url.to_string(),
                detail: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_uses_server_message() {
        let e = JobError::rejected(Some("quota exceeded"));
        assert_eq!(e.to_string(), "quota exceeded");
    }

    #[test]
    fn rejected_falls_back_on_missing_or_blank_message() {
        assert_eq!(JobError::rejected(None).to_string(), GENERIC_FAILURE_MESSAGE);
        assert_eq!(
            JobError::rejected(Some("   ")).to_string(),
            GENERIC_FAILURE_MESSAGE
        );
    }

    #[test]
    fn transient_classification() {
        let transport = JobError::Transport {
            url: "http://x/results".into(),
            detail: "connection refused".into(),
        };
        assert!(transport.is_transient());
        assert!(JobError::Http {
            status: 503,
            url: "u".into()
        }
        .is_transient());
        assert!(!JobError::Http {
            status: 404,
            url: "u".into()
        }
        .is_transient());
        for status in [408, 429, 502] {
            assert!(is_retryable_status(status), "{status}");
        }
        assert!(!is_retryable_status(404));
        assert!(!JobError::rejected(Some("bad job")).is_transient());
        assert!(!JobError::Validation("no links".into()).is_transient());
    }

    #[test]
    fn display_includes_url_and_status() {
        let e = JobError::Http {
            status: 502,
            url: "http://localhost:8000/results".into(),
        };
        let s = e.to_string();
        assert!(s.contains("502"), "{s}");
        assert!(s.contains("/results"), "{s}");
    }
}
