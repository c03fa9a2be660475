//! REST/bulk-JSON destination store client.
//!
//! Speaks a small keyed-upsert protocol over HTTP:
//!
//! - `POST {base}/bulk` with `{"refresh": bool, "documents": [...]}`,
//!   answered by `{"items": [{"id", "result", "status"?, "error"?}]}` with
//!   one item per document in submission order;
//! - `GET {base}/documents/{id}` answering 200 (exists) or 404 (absent);
//! - `POST {base}/refresh` to make prior writes visible to lookups.
//!
//! Whole-call failures are classified like fetches: 5xx and 429 are
//! transport faults worth retrying, everything else is a rejection.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use super::{DocumentStore, ErrorDetail, StoreError, UpsertOutcome, UpsertStatus};
use crate::document::Document;
use crate::types::DocId;

#[derive(Serialize)]
struct BulkRequest<'a> {
    refresh: bool,
    documents: &'a [Document],
}

#[derive(Deserialize)]
struct BulkResponse {
    items: Vec<BulkItem>,
}

#[derive(Serialize, Deserialize)]
struct BulkItem {
    id: DocId,
    result: BulkItemResult,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BulkItemResult {
    Created,
    Updated,
    Failed,
}

impl From<BulkItem> for UpsertOutcome {
    fn from(item: BulkItem) -> Self {
        match item.result {
            BulkItemResult::Created => UpsertOutcome::Accepted {
                id: item.id,
                status: UpsertStatus::Created,
            },
            BulkItemResult::Updated => UpsertOutcome::Accepted {
                id: item.id,
                status: UpsertStatus::Updated,
            },
            BulkItemResult::Failed => {
                let status = item.status;
                let retryable =
                    matches!(status, Some(s) if s == 429 || s >= 500);
                UpsertOutcome::Failed {
                    id: item.id,
                    detail: ErrorDetail {
                        status,
                        reason: item
                            .error
                            .unwrap_or_else(|| "unspecified store error".to_string()),
                        retryable,
                    },
                }
            }
        }
    }
}

fn classify(status: StatusCode, reason: String) -> StoreError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Transport {
            status: Some(status.as_u16()),
            reason,
        }
    } else {
        StoreError::Rejected {
            status: status.as_u16(),
            reason,
        }
    }
}

fn transport(err: &reqwest::Error) -> StoreError {
    StoreError::Transport {
        status: err.status().map(|s| s.as_u16()),
        reason: err.to_string(),
    }
}

/// Destination store reached over the REST/bulk protocol above.
#[derive(Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    refresh_on_write: bool,
}

impl fmt::Debug for HttpDocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDocumentStore")
            .field("base_url", &self.base_url.as_str())
            .field("refresh_on_write", &self.refresh_on_write)
            .finish_non_exhaustive()
    }
}

impl HttpDocumentStore {
    #[must_use]
    pub fn builder(base_url: Url) -> HttpDocumentStoreBuilder {
        HttpDocumentStoreBuilder {
            base_url,
            api_key: None,
            timeout: Duration::from_secs(30),
            refresh_on_write: true,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url.join(path).map_err(|e| StoreError::Config {
            reason: format!("invalid endpoint {path}: {e}"),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    #[instrument(skip(self, documents), fields(count = documents.len()), err)]
    async fn bulk_upsert(&self, documents: &[Document]) -> Result<Vec<UpsertOutcome>, StoreError> {
        let url = self.endpoint("bulk")?;
        let request = BulkRequest {
            refresh: self.refresh_on_write,
            documents,
        };

        let response = self
            .request(self.client.post(url))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(classify(status, reason));
        }

        let parsed: BulkResponse = response.json().await.map_err(|e| transport(&e))?;
        if parsed.items.len() != documents.len() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                reason: format!(
                    "bulk response carried {} items for {} documents",
                    parsed.items.len(),
                    documents.len()
                ),
            });
        }
        Ok(parsed.items.into_iter().map(UpsertOutcome::from).collect())
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let url = self.endpoint(&format!("documents/{id}"))?;
        let response = self
            .request(self.client.get(url))
            .send()
            .await
            .map_err(|e| transport(&e))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let reason = response.text().await.unwrap_or_default();
                Err(classify(status, reason))
            }
        }
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        let url = self.endpoint("refresh")?;
        let response = self
            .request(self.client.post(url))
            .send()
            .await
            .map_err(|e| transport(&e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let reason = response.text().await.unwrap_or_default();
            Err(classify(status, reason))
        }
    }
}

/// Builder for [`HttpDocumentStore`].
#[derive(Clone, Debug)]
pub struct HttpDocumentStoreBuilder {
    base_url: Url,
    api_key: Option<String>,
    timeout: Duration,
    refresh_on_write: bool,
}

impl HttpDocumentStoreBuilder {
    /// Bearer token sent with every request.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the store to refresh as part of each bulk call instead of via
    /// separate `refresh` requests.
    #[must_use]
    pub fn refresh_on_write(mut self, refresh: bool) -> Self {
        self.refresh_on_write = refresh;
        self
    }

    pub fn build(self) -> Result<HttpDocumentStore, StoreError> {
        let mut base_url = self.base_url;
        // Url::join treats a path without trailing slash as a file.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(self.timeout)
            .build()
            .map_err(|e| StoreError::Config {
                reason: e.to_string(),
            })?;
        Ok(HttpDocumentStore {
            client,
            base_url,
            api_key: self.api_key,
            refresh_on_write: self.refresh_on_write,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_normalizes_base_path() {
        let store = HttpDocumentStore::builder(Url::parse("https://idx.example.com/v1").unwrap())
            .build()
            .unwrap();
        assert_eq!(
            store.endpoint("bulk").unwrap().as_str(),
            "https://idx.example.com/v1/bulk"
        );
        assert_eq!(
            store.endpoint("documents/site-1").unwrap().as_str(),
            "https://idx.example.com/v1/documents/site-1"
        );
    }

    #[test]
    fn failed_item_maps_retryable_from_status() {
        let throttled: UpsertOutcome = BulkItem {
            id: "a".into(),
            result: BulkItemResult::Failed,
            status: Some(429),
            error: Some("throttled".into()),
        }
        .into();
        match throttled {
            UpsertOutcome::Failed { detail, .. } => assert!(detail.retryable),
            UpsertOutcome::Accepted { .. } => panic!("expected failure"),
        }

        let mapping: UpsertOutcome = BulkItem {
            id: "b".into(),
            result: BulkItemResult::Failed,
            status: Some(400),
            error: Some("mapping error".into()),
        }
        .into();
        match mapping {
            UpsertOutcome::Failed { detail, .. } => assert!(!detail.retryable),
            UpsertOutcome::Accepted { .. } => panic!("expected failure"),
        }
    }

    #[test]
    fn bulk_item_result_uses_lowercase_wire_form() {
        let item = BulkItem {
            id: "a".into(),
            result: BulkItemResult::Created,
            status: None,
            error: None,
        };
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"result\":\"created\""));
    }
}
