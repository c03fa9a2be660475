/*! Fault-tolerant retrieval of source content.

Wraps a [`reqwest::Client`] with the retry discipline the rest of the
pipeline relies on: failures are classified as transient (worth retrying
with backoff) or fatal (the resource will never succeed), and retries
pace themselves with a capped exponential [`BackoffPolicy`].

Classification rules:
- network-level errors (timeout, connection reset) are transient;
- HTTP 5xx, 403 and 429 are transient (rate limiting and flaky origins);
- any other non-success status is fatal and is never retried.

A fetch performs no side effects beyond the network call, so repeating
one after a crash-resume is always safe.
*/

pub mod backoff;

pub use backoff::BackoffPolicy;

use std::time::Duration;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use reqwest::{Client, StatusCode, header};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::control::CancelToken;

/// Raw payload retrieved for one frontier unit, handed to the extractor.
#[derive(Clone, Debug)]
pub struct RawContent {
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    /// Expected to succeed on retry: network faults, 5xx, 403, 429.
    #[error("transient fetch failure{}: {reason}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    #[diagnostic(
        code(tideline::fetch::transient),
        help("The endpoint may be rate limiting or briefly unavailable; re-running is safe.")
    )]
    Transient { status: Option<u16>, reason: String },

    /// Will not change outcome on retry; the unit should be skipped.
    #[error("fatal fetch failure (HTTP {status}) for {url}")]
    #[diagnostic(
        code(tideline::fetch::fatal),
        help("Permanent client errors are never retried; check the source URL.")
    )]
    Fatal { status: u16, url: String },

    /// The run was cancelled while waiting out a backoff delay.
    #[error("fetch cancelled")]
    #[diagnostic(code(tideline::fetch::cancelled))]
    Cancelled,

    /// HTTP client could not be constructed; a configuration fault.
    #[error("fetch client configuration: {reason}")]
    #[diagnostic(code(tideline::fetch::client))]
    Client { reason: String },
}

impl FetchError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transient { status, .. } => *status,
            FetchError::Fatal { status, .. } => Some(*status),
            FetchError::Cancelled | FetchError::Client { .. } => None,
        }
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        FetchError::Transient {
            status: err.status().map(|s| s.as_u16()),
            reason: err.to_string(),
        }
    }
}

/// True when a non-success status is worth retrying.
fn transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Retrieves source content with transient/fatal classification and
/// cancellable retry pacing.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: Client,
    policy: BackoffPolicy,
    max_attempts: u32,
}

impl Fetcher {
    #[must_use]
    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::default()
    }

    /// Single attempt, no retries. Classification only.
    pub async fn fetch(&self, url: &Url) -> Result<RawContent, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        if status.is_success() {
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response
                .text()
                .await
                .map_err(|e| FetchError::from_reqwest(&e))?;
            Ok(RawContent {
                url: url.clone(),
                status: status.as_u16(),
                content_type,
                body,
                fetched_at: Utc::now(),
            })
        } else if transient_status(status) {
            Err(FetchError::Transient {
                status: Some(status.as_u16()),
                reason: format!("HTTP {status}"),
            })
        } else {
            Err(FetchError::Fatal {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
    }

    /// Fetch with retry: transient failures back off and try again until the
    /// attempt cap is reached; fatal failures return immediately. The backoff
    /// sleep races the cancel token so a stopping run never waits out a delay.
    #[instrument(skip(self, cancel), fields(url = %url), err)]
    pub async fn fetch_with_retry(
        &self,
        url: &Url,
        cancel: &CancelToken,
    ) -> Result<RawContent, FetchError> {
        let mut failures: u32 = 0;
        loop {
            match self.fetch(url).await {
                Ok(content) => return Ok(content),
                Err(err) if err.is_transient() => {
                    failures += 1;
                    if failures >= self.max_attempts {
                        warn!(attempts = failures, "retry budget exhausted");
                        return Err(err);
                    }
                    let delay = self.policy.delay_for(failures);
                    debug!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, backing off"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => return Err(FetchError::Cancelled),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Builder for [`Fetcher`].
///
/// ```no_run
/// use std::time::Duration;
/// use tideline::fetch::{BackoffPolicy, Fetcher};
///
/// let fetcher = Fetcher::builder()
///     .timeout(Duration::from_secs(30))
///     .max_attempts(5)
///     .backoff(BackoffPolicy::default())
///     .build()?;
/// # Ok::<(), tideline::fetch::FetchError>(())
/// ```
#[derive(Clone, Debug)]
pub struct FetcherBuilder {
    timeout: Duration,
    user_agent: String,
    policy: BackoffPolicy,
    max_attempts: u32,
}

impl Default for FetcherBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("tideline/", env!("CARGO_PKG_VERSION")).to_string(),
            policy: BackoffPolicy::default(),
            max_attempts: 5,
        }
    }
}

impl FetcherBuilder {
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Total attempt cap, counting the first try. Must be at least 1.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn build(self) -> Result<Fetcher, FetchError> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| FetchError::Client {
                reason: e.to_string(),
            })?;
        Ok(Fetcher {
            client,
            policy: self.policy,
            max_attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttles_are_transient() {
        assert!(transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(transient_status(StatusCode::FORBIDDEN));
        assert!(transient_status(StatusCode::TOO_MANY_REQUESTS));
    }

    #[test]
    fn other_client_errors_are_fatal() {
        assert!(!transient_status(StatusCode::NOT_FOUND));
        assert!(!transient_status(StatusCode::BAD_REQUEST));
        assert!(!transient_status(StatusCode::GONE));
    }

    #[test]
    fn builder_enforces_attempt_floor() {
        let builder = Fetcher::builder().max_attempts(0);
        assert_eq!(builder.max_attempts, 1);
    }

    #[test]
    fn fatal_error_reports_status() {
        let err = FetchError::Fatal {
            status: 404,
            url: "https://example.com/missing".to_string(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(404));
    }
}
