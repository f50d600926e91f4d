//! Per-repository access policy documents
//!
//! Resolves the raw-content URL of the document, fetches it, substitutes
//! `@@NAME@@` placeholders from the build environment and validates its shape.

mod fetcher;
mod source;
mod substitute;

pub use fetcher::{parse_document, PolicyFetcher, PolicySource};
pub use source::raw_content_url;
pub use substitute::substitute;
