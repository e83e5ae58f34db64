//! Outbound adapters for collaborator ports.

mod content_filter;

pub use content_filter::{AllowAll, KeywordFilter, content_filter};
