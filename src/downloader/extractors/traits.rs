// InfoExtractor trait

use async_trait::async_trait;

use crate::downloader::models::{MediaInfo, Platform};

/// Best-effort metadata source.
///
/// Metadata is advisory: implementations never fail and return
/// `MediaInfo::fallback` when anything goes wrong, so a broken metadata
/// lookup can never block a download.
#[async_trait]
pub trait InfoExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    async fn extract(&self, url: &str, platform: Platform) -> MediaInfo;
}

/// Extractor that always answers with the placeholder record.
pub struct PlaceholderExtractor;

#[async_trait]
impl InfoExtractor for PlaceholderExtractor {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    async fn extract(&self, _url: &str, platform: Platform) -> MediaInfo {
        MediaInfo::fallback(platform)
    }
}
