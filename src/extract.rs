//! Extraction seam between fetched content and the document model.
//!
//! Extraction is site-specific and lives outside this crate; the pipeline
//! only requires the narrow [`Extractor`] contract defined here.
//!
//! # Design Principles
//!
//! - **Pure**: an extractor must be deterministic and side-effect-free given
//!   identical input. The driver may re-invoke it after a crash-resume on a
//!   page that was fetched but never checkpointed.
//! - **Zero is valid**: returning an empty vector is a normal outcome (an
//!   empty month, a listing page of already-known items), not an error.
//! - **Item counts matter**: in paginated mode the number of returned
//!   documents is the page's item count, which the frontier uses for its
//!   end-of-data decision. Extractors must therefore emit one document per
//!   listed item rather than batching or splitting.
//!
//! # Examples
//!
//! ```rust
//! use tideline::document::Document;
//! use tideline::extract::{ExtractError, Extractor};
//! use tideline::fetch::RawContent;
//! use tideline::frontier::FrontierCursor;
//!
//! struct TitleListing;
//!
//! impl Extractor for TitleListing {
//!     fn extract(
//!         &self,
//!         content: &RawContent,
//!         cursor: &FrontierCursor,
//!     ) -> Result<Vec<Document>, ExtractError> {
//!         content
//!             .body
//!             .lines()
//!             .filter(|line| !line.trim().is_empty())
//!             .map(|line| {
//!                 Document::builder()
//!                     .id(format!("demo-{}-{line}", cursor))
//!                     .body(line.to_string(), Default::default())
//!                     .url(content.url.as_str())
//!                     .domain("example.com")
//!                     .build()
//!                     .map_err(|e| ExtractError::Malformed {
//!                         reason: e.to_string(),
//!                     })
//!             })
//!             .collect()
//!     }
//! }
//! ```

use miette::Diagnostic;
use thiserror::Error;

use crate::document::Document;
use crate::fetch::RawContent;
use crate::frontier::FrontierCursor;

/// Maps raw fetched content to zero or more documents.
pub trait Extractor: Send + Sync {
    fn extract(
        &self,
        content: &RawContent,
        cursor: &FrontierCursor,
    ) -> Result<Vec<Document>, ExtractError>;
}

#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    /// The payload could not be interpreted at all. The driver skips the
    /// unit and keeps the run alive.
    #[error("malformed source content: {reason}")]
    #[diagnostic(
        code(tideline::extract::malformed),
        help("The unit is skipped; the run continues. Inspect the source payload.")
    )]
    Malformed { reason: String },

    /// The payload's content type is not one this extractor understands.
    #[error("unsupported content type: {content_type}")]
    #[diagnostic(code(tideline::extract::unsupported))]
    Unsupported { content_type: String },
}

/// Adapter turning a closure into an [`Extractor`], mostly for wiring up
/// small sources and test doubles.
///
/// ```rust
/// use tideline::extract::{from_fn, Extractor};
///
/// let extractor = from_fn(|_content, _cursor| Ok(Vec::new()));
/// ```
pub fn from_fn<F>(f: F) -> FnExtractor<F>
where
    F: Fn(&RawContent, &FrontierCursor) -> Result<Vec<Document>, ExtractError> + Send + Sync,
{
    FnExtractor { f }
}

pub struct FnExtractor<F> {
    f: F,
}

impl<F> Extractor for FnExtractor<F>
where
    F: Fn(&RawContent, &FrontierCursor) -> Result<Vec<Document>, ExtractError> + Send + Sync,
{
    fn extract(
        &self,
        content: &RawContent,
        cursor: &FrontierCursor,
    ) -> Result<Vec<Document>, ExtractError> {
        (self.f)(content, cursor)
    }
}
