// MediaService - the surface a routing layer talks to

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::downloader::errors::DownloadError;
use crate::downloader::extractors::{CliInfoExtractor, InfoExtractor};
use crate::downloader::models::{DownloadOptions, DownloadResult, MediaInfo, MediaRequest, Platform};
use crate::downloader::orchestrator::Downloader;
use crate::downloader::tools::ToolManager;
use crate::downloader::traits::{NoopProgress, ProgressObserver};
use crate::sweeper::{RetentionSweeper, SweepError};
use crate::validation::validate_url;

pub struct MediaService {
    config: Arc<ServiceConfig>,
    extractor: Arc<dyn InfoExtractor>,
    downloader: Downloader,
    sweeper: RetentionSweeper,
}

impl MediaService {
    /// Service backed by the yt-dlp CLI for both metadata and downloads.
    pub fn new(config: ServiceConfig) -> Self {
        let extractor = Arc::new(CliInfoExtractor::from_config(&config));
        Self::with_components(Arc::new(config), extractor, Arc::new(NoopProgress))
    }

    pub fn with_components(
        config: Arc<ServiceConfig>,
        extractor: Arc<dyn InfoExtractor>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let downloader = Downloader::new(config.clone(), extractor.clone()).with_observer(observer);
        let sweeper = RetentionSweeper::new(config.downloads_dir.clone(), config.retention);
        Self {
            config,
            extractor,
            downloader,
            sweeper,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Best-effort metadata; never fails.
    pub async fn get_media_info(&self, url: &str, platform: Platform) -> MediaInfo {
        self.extractor.extract(url.trim(), platform).await
    }

    pub async fn download_media(&self, url: &str, options: DownloadOptions) -> Result<DownloadResult, DownloadError> {
        self.download_media_with_cancel(url, options, CancellationToken::new())
            .await
    }

    /// Validate `url`, then run one download job. The platform detected from
    /// the URL takes precedence over the one in `options`.
    pub async fn download_media_with_cancel(
        &self,
        url: &str,
        options: DownloadOptions,
        cancel: CancellationToken,
    ) -> Result<DownloadResult, DownloadError> {
        let validated = validate_url(url)?;
        let options = DownloadOptions {
            platform: validated.platform,
            ..options
        };
        let request = MediaRequest::new(validated.clean_url, options);
        self.downloader.execute_with_cancel(&request, cancel).await
    }

    /// One sweep of the downloads directory.
    pub async fn sweep_now(&self) -> Result<usize, SweepError> {
        self.sweeper.sweep().await
    }

    /// Start the periodic sweeper; it runs once immediately.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        debug!(dir = %self.config.downloads_dir.display(), "scheduling file cleanup");
        self.sweeper.clone().spawn(self.config.sweep_interval, cancel)
    }

    pub fn tool_manager(&self) -> ToolManager {
        ToolManager::new(self.config.tool.clone(), self.config.ffmpeg_location.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::errors::ErrorKind;
    use crate::downloader::tools::ToolCommand;

    fn service_without_tool() -> (tempfile::TempDir, MediaService) {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::default()
            .with_downloads_dir(dir.path())
            .with_tool(ToolCommand::new("/nonexistent/yt-dlp"));
        (dir, MediaService::new(config))
    }

    #[tokio::test]
    async fn invalid_urls_never_reach_the_tool() {
        let (_dir, service) = service_without_tool();
        let err = service
            .download_media("https://vimeo.com/1", DownloadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service
            .download_media("javascript:alert(1)", DownloadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_descriptor().status, 400);
    }

    #[tokio::test]
    async fn valid_url_without_tool_is_a_tooling_error() {
        let (_dir, service) = service_without_tool();
        let err = service
            .download_media("https://youtu.be/dQw4w9WgXcQ", DownloadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolingUnavailable);
    }

    #[tokio::test]
    async fn media_info_degrades_without_tool() {
        let (_dir, service) = service_without_tool();
        let info = service.get_media_info("https://youtu.be/x", Platform::Youtube).await;
        assert_eq!(info, MediaInfo::fallback(Platform::Youtube));
    }

    #[tokio::test]
    async fn sweep_now_on_fresh_directory_deletes_nothing() {
        let (dir, service) = service_without_tool();
        std::fs::write(dir.path().join("new.mp4"), b"x").unwrap();
        assert_eq!(service.sweep_now().await.unwrap(), 0);
    }
}
