//! Content moderation port.

/// Decides whether ad text must be hidden. Implementations may call out to a
/// classifier; the core only consumes the verdict.
#[async_trait::async_trait]
pub trait ContentFilter: Send + Sync {
    /// Returns `true` when `text` must not be published.
    async fn is_flagged(&self, text: &str) -> bool;
}
