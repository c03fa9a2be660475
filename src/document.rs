//! Canonical document record produced by extractors and consumed by the indexer.
//!
//! A [`Document`] is an immutable value: extractors build one per source item,
//! the existence index reads its id, and the batch indexer writes it at most
//! once per run. Identity is carried entirely by `id`, which is derived
//! deterministically from source identity (see [`document_id`]) so that
//! re-ingesting the same source item always yields the same id.
//!
//! Optional fields are modeled as `Option`, never as absent keys, so required
//! fields (`id`, `body`) can be validated exhaustively before indexing.
//!
//! # Examples
//!
//! ```
//! use tideline::document::{Document, BodyType, DocType};
//!
//! let doc = Document::builder()
//!     .id("forum-12345")
//!     .title("Fee estimation under load")
//!     .body("full post text", BodyType::Raw)
//!     .url("https://forum.example/t/12345")
//!     .domain("https://forum.example")
//!     .doc_type(DocType::Topic)
//!     .authors(["satoshi"])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(doc.id, "forum-12345");
//! assert!(doc.created_at.is_none());
//! ```

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::types::DocId;

/// How the `body` field is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    /// Unprocessed source text.
    #[default]
    Raw,
    /// Markdown, typically from converted HTML.
    Markdown,
    /// Original HTML markup.
    Html,
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyType::Raw => write!(f, "raw"),
            BodyType::Markdown => write!(f, "markdown"),
            BodyType::Html => write!(f, "html"),
        }
    }
}

/// Open document classification tag.
///
/// Sources disagree on what a unit of content is (a forum topic, a reply, the
/// original post of a thread), so this is intentionally not a closed enum:
/// unknown tags round-trip through [`DocType::encode`] / [`DocType::decode`]
/// unchanged rather than failing.
///
/// # Examples
///
/// ```
/// use tideline::document::DocType;
///
/// assert_eq!(DocType::Topic.encode(), "topic");
/// assert_eq!(DocType::decode("reply"), DocType::Reply);
///
/// // Unknown tags are preserved, not rejected.
/// let other = DocType::decode("changelog");
/// assert_eq!(other, DocType::Other("changelog".into()));
/// assert_eq!(other.encode(), "changelog");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocType {
    Topic,
    Post,
    Reply,
    OriginalPost,
    /// Any tag not covered by the named variants.
    Other(String),
}

impl DocType {
    /// Stable string form used in serialized documents.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            DocType::Topic => "topic".into(),
            DocType::Post => "post".into(),
            DocType::Reply => "reply".into(),
            DocType::OriginalPost => "original_post".into(),
            DocType::Other(tag) => tag.clone(),
        }
    }

    /// Parse a stored tag, preserving unknown values as [`DocType::Other`].
    #[must_use]
    pub fn decode(s: &str) -> Self {
        match s {
            "topic" => DocType::Topic,
            "post" => DocType::Post,
            "reply" => DocType::Reply,
            "original_post" => DocType::OriginalPost,
            other => DocType::Other(other.to_string()),
        }
    }
}

impl Default for DocType {
    fn default() -> Self {
        DocType::Post
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl From<String> for DocType {
    fn from(s: String) -> Self {
        DocType::decode(&s)
    }
}

impl From<DocType> for String {
    fn from(t: DocType) -> Self {
        t.encode()
    }
}

impl From<&str> for DocType {
    fn from(s: &str) -> Self {
        DocType::decode(s)
    }
}

/// Normalized record for one source item, immutable once built.
///
/// Two documents with equal `id` are the same logical item; the destination
/// store overwrites rather than duplicates (upsert keyed by id), which is what
/// makes re-ingestion after a crash safe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Globally unique, deterministic id. Never randomly generated.
    pub id: DocId,
    /// When the source says the item was created; `None` when unknown.
    /// Never fabricated from ingestion time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When this record was written to the destination store. Stamped by the
    /// batch indexer at submission if the extractor left it unset.
    #[serde(default)]
    pub indexed_at: Option<DateTime<Utc>>,
    /// Full content in the encoding named by `body_type`.
    pub body: String,
    pub body_type: BodyType,
    #[serde(default)]
    pub title: Option<String>,
    /// Authors in source order.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Unordered labels; `BTreeSet` keeps serialization deterministic.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub url: String,
    pub domain: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
}

impl Document {
    /// Start building a document. `build()` validates required fields.
    #[must_use]
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::default()
    }

    /// Check the required-field invariants (`id` and `body` non-empty).
    ///
    /// The batch indexer calls this before submission; extractors that use
    /// [`Document::builder`] get the same check at `build()` time.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.id.trim().is_empty() {
            return Err(DocumentError::MissingId);
        }
        if self.body.is_empty() {
            return Err(DocumentError::EmptyBody {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// Builder for [`Document`], validating on `build()`.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    id: Option<DocId>,
    created_at: Option<DateTime<Utc>>,
    indexed_at: Option<DateTime<Utc>>,
    body: Option<String>,
    body_type: BodyType,
    title: Option<String>,
    authors: Vec<String>,
    tags: BTreeSet<String>,
    url: Option<String>,
    domain: Option<String>,
    doc_type: DocType,
}

impl DocumentBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    #[must_use]
    pub fn indexed_at(mut self, at: DateTime<Utc>) -> Self {
        self.indexed_at = Some(at);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>, body_type: BodyType) -> Self {
        self.body = Some(body.into());
        self.body_type = body_type;
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn doc_type(mut self, doc_type: DocType) -> Self {
        self.doc_type = doc_type;
        self
    }

    /// Finish the document, checking required fields.
    pub fn build(self) -> Result<Document, DocumentError> {
        let doc = Document {
            id: self.id.unwrap_or_default(),
            created_at: self.created_at,
            indexed_at: self.indexed_at,
            body: self.body.unwrap_or_default(),
            body_type: self.body_type,
            title: self.title,
            authors: self.authors,
            tags: self.tags,
            url: self.url.unwrap_or_default(),
            domain: self.domain.unwrap_or_default(),
            doc_type: self.doc_type,
        };
        doc.validate()?;
        Ok(doc)
    }
}

/// Derive a deterministic document id from site name and natural key.
///
/// The destination store keys upserts on this value, so it must be stable
/// across runs: same source item, same id. Whitespace in the natural key is
/// collapsed to single hyphens so ids stay URL- and query-safe.
///
/// # Examples
///
/// ```
/// use tideline::document::document_id;
///
/// assert_eq!(document_id("bitcointalk", "5124918"), "bitcointalk-5124918");
/// assert_eq!(document_id("list", "2020-12 msg 04"), "list-2020-12-msg-04");
/// ```
#[must_use]
pub fn document_id(site: &str, natural_key: &str) -> DocId {
    let key: String = natural_key
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    format!("{site}-{key}")
}

/// Validation failures for a [`Document`].
#[derive(Debug, Error, Diagnostic)]
pub enum DocumentError {
    #[error("document id is empty")]
    #[diagnostic(
        code(tideline::document::missing_id),
        help("Derive the id from source identity with document_id(site, natural_key).")
    )]
    MissingId,

    #[error("document {id} has an empty body")]
    #[diagnostic(
        code(tideline::document::empty_body),
        help("Extractors must not emit body-less documents; skip the item instead.")
    )]
    EmptyBody { id: DocId },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> DocumentBuilder {
        Document::builder()
            .id("site-1")
            .body("text", BodyType::Raw)
            .url("https://example.org/1")
            .domain("https://example.org")
    }

    #[test]
    /// Builder round-trip with all optional fields left unset.
    fn build_minimal_document() {
        let doc = minimal().build().unwrap();
        assert_eq!(doc.id, "site-1");
        assert_eq!(doc.body_type, BodyType::Raw);
        assert!(doc.created_at.is_none());
        assert!(doc.indexed_at.is_none());
        assert!(doc.title.is_none());
        assert!(doc.authors.is_empty());
        assert!(doc.tags.is_empty());
    }

    #[test]
    fn build_rejects_missing_id() {
        let err = Document::builder()
            .body("text", BodyType::Raw)
            .build()
            .unwrap_err();
        assert!(matches!(err, DocumentError::MissingId));
    }

    #[test]
    fn build_rejects_empty_body() {
        let err = Document::builder().id("site-2").build().unwrap_err();
        assert!(matches!(err, DocumentError::EmptyBody { .. }));
    }

    #[test]
    fn whitespace_only_id_is_rejected() {
        let err = minimal().id("   ").build().unwrap_err();
        assert!(matches!(err, DocumentError::MissingId));
    }

    #[test]
    /// Same source identity must always produce the same id.
    fn document_id_is_deterministic() {
        let a = document_id("bitcointalk", "5124918.msg53395918");
        let b = document_id("bitcointalk", "5124918.msg53395918");
        assert_eq!(a, b);
        assert_eq!(a, "bitcointalk-5124918.msg53395918");
    }

    #[test]
    fn document_id_collapses_whitespace() {
        assert_eq!(document_id("s", "a  b\tc"), "s-a-b-c");
    }

    #[test]
    fn doc_type_round_trips_unknown_tags() {
        for tag in ["topic", "post", "reply", "original_post", "snapshot"] {
            assert_eq!(DocType::decode(tag).encode(), tag);
        }
    }

    #[test]
    fn doc_type_serde_uses_open_string_form() {
        let doc = minimal().doc_type(DocType::Other("digest".into())).build().unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"type\":\"digest\""));
        let parsed: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.doc_type, DocType::Other("digest".into()));
    }

    #[test]
    fn tags_serialize_deterministically() {
        let doc = minimal().tag("zeta").tag("alpha").build().unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let alpha = json.find("alpha").unwrap();
        let zeta = json.find("zeta").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn authors_preserve_source_order() {
        let doc = minimal().authors(["second-post", "first-post"]).build().unwrap();
        assert_eq!(doc.authors, vec!["second-post", "first-post"]);
    }

    #[test]
    fn serde_round_trip() {
        let doc = minimal()
            .title("A title")
            .created_at(Utc::now())
            .doc_type(DocType::Reply)
            .build()
            .unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, parsed);
    }
}
