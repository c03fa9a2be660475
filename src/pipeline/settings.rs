//! Flat configuration surface for one ingestion run.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::frontier::FrontierCursor;

/// Everything a run needs to know, as one flat value.
///
/// The driver treats this as opaque: it reads fields, never interprets them.
/// Construct with [`IngestSettings::new`] plus builder methods, or from
/// `TIDELINE_*` environment variables via [`IngestSettings::from_env`].
#[derive(Clone, Debug)]
pub struct IngestSettings {
    /// Name of the source; keys the checkpoint record.
    pub source_name: String,
    /// Destination store base URL.
    pub base_url: String,
    /// Bearer token for the destination store, if it requires one.
    pub auth_token: Option<String>,
    /// Documents per bulk upsert.
    pub batch_size: usize,
    /// Concurrent frontier units in flight.
    pub fetch_width: usize,
    /// Attempt cap for fetches and store calls, counting the first try.
    pub max_retries: u32,
    /// First backoff delay.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
    /// Items per listing page (paginated sources).
    pub page_size: usize,
    /// Per-request timeout for fetches and store calls.
    pub request_timeout: Duration,
    /// Start here instead of the stored checkpoint, when set.
    pub resume_override: Option<FrontierCursor>,
    /// Refresh the store after each batch so writes are visible to the next
    /// unit's existence checks.
    pub refresh_after_batch: bool,
}

impl IngestSettings {
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    pub const DEFAULT_FETCH_WIDTH: usize = 32;
    pub const DEFAULT_MAX_RETRIES: u32 = 5;
    pub const DEFAULT_PAGE_SIZE: usize = 40;

    #[must_use]
    pub fn new(source_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            base_url: base_url.into(),
            auth_token: None,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            fetch_width: Self::DEFAULT_FETCH_WIDTH,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            page_size: Self::DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
            resume_override: None,
            refresh_after_batch: true,
        }
    }

    /// Read settings from `TIDELINE_*` environment variables, after loading
    /// `.env` if one is present.
    ///
    /// `TIDELINE_SOURCE` and `TIDELINE_BASE_URL` are required; the rest fall
    /// back to defaults. Unparseable numeric values are an error rather than
    /// a silent default.
    pub fn from_env() -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let source_name = require_env("TIDELINE_SOURCE")?;
        let base_url = require_env("TIDELINE_BASE_URL")?;
        let mut settings = Self::new(source_name, base_url);

        settings.auth_token = std::env::var("TIDELINE_AUTH_TOKEN").ok();
        if let Some(n) = parse_env("TIDELINE_BATCH_SIZE")? {
            settings.batch_size = n;
        }
        if let Some(n) = parse_env("TIDELINE_FETCH_WIDTH")? {
            settings.fetch_width = n;
        }
        if let Some(n) = parse_env("TIDELINE_MAX_RETRIES")? {
            settings.max_retries = n;
        }
        if let Some(n) = parse_env::<u64>("TIDELINE_BACKOFF_BASE_MS")? {
            settings.backoff_base = Duration::from_millis(n);
        }
        if let Some(n) = parse_env::<u64>("TIDELINE_BACKOFF_CAP_MS")? {
            settings.backoff_cap = Duration::from_millis(n);
        }
        if let Some(n) = parse_env("TIDELINE_PAGE_SIZE")? {
            settings.page_size = n;
        }
        if let Some(n) = parse_env::<u64>("TIDELINE_REQUEST_TIMEOUT_SECS")? {
            settings.request_timeout = Duration::from_secs(n);
        }
        Ok(settings)
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_fetch_width(mut self, fetch_width: usize) -> Self {
        self.fetch_width = fetch_width.max(1);
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Ignore the stored checkpoint and resume as if `cursor` had just been
    /// completed.
    #[must_use]
    pub fn with_resume_override(mut self, cursor: FrontierCursor) -> Self {
        self.resume_override = Some(cursor);
        self
    }

    #[must_use]
    pub fn with_refresh_after_batch(mut self, refresh: bool) -> Self {
        self.refresh_after_batch = refresh;
        self
    }
}

fn require_env(key: &'static str) -> Result<String, SettingsError> {
    std::env::var(key).map_err(|_| SettingsError::Missing { key })
}

fn parse_env<T>(key: &'static str) -> Result<Option<T>, SettingsError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| SettingsError::Invalid {
                key,
                value: raw,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Configuration faults surfaced before a run starts.
#[derive(Debug, Error, Diagnostic)]
pub enum SettingsError {
    #[error("required setting {key} is not set")]
    #[diagnostic(
        code(tideline::settings::missing),
        help("Set the environment variable or provide the value programmatically.")
    )]
    Missing { key: &'static str },

    #[error("setting {key}={value:?} could not be parsed: {reason}")]
    #[diagnostic(code(tideline::settings::invalid))]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
