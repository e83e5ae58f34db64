//! Content filter adapters.

use std::sync::Arc;

use async_trait::async_trait;

use market_types::ContentFilter;

/// Flags text containing any of a fixed set of words, ignoring case.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    blocked: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocked = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { blocked }
    }

    /// Parses a comma separated list such as `BLOCKED_WORDS=scam,stolen`.
    pub fn from_csv(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

#[async_trait]
impl ContentFilter for KeywordFilter {
    async fn is_flagged(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.blocked.iter().any(|word| text.contains(word.as_str()))
    }
}

/// Publishes everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl ContentFilter for AllowAll {
    async fn is_flagged(&self, _text: &str) -> bool {
        false
    }
}

/// Picks the filter for a configured word list: [`AllowAll`] when the list
/// has no usable words, a [`KeywordFilter`] otherwise.
pub fn content_filter<I, S>(words: I) -> Arc<dyn ContentFilter>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let keywords = KeywordFilter::new(words);
    if keywords.is_empty() {
        tracing::warn!("no blocked words configured, ads are published unfiltered");
        Arc::new(AllowAll)
    } else {
        Arc::new(keywords)
    }
}
