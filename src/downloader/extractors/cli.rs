// CLI InfoExtractor - `yt-dlp --dump-json`
//
// Runs the tool in metadata-only mode and maps the JSON document it prints
// into a `MediaInfo`. Every failure path degrades to the fallback record.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::traits::InfoExtractor;
use crate::config::ServiceConfig;
use crate::downloader::models::{
    MediaInfo, Platform, DESCRIPTION_LIMIT, PLACEHOLDER_TITLE, UNKNOWN_UPLOADER,
};
use crate::downloader::profiles::profile_args;
use crate::downloader::tools::ToolCommand;
use crate::downloader::utils::{run_output_with_timeout, truncate_utf16};

/// CLI-based info extractor using the yt-dlp binary
pub struct CliInfoExtractor {
    tool: ToolCommand,
    timeout: Duration,
    grace: Duration,
}

impl CliInfoExtractor {
    pub fn new(tool: ToolCommand, timeout: Duration) -> Self {
        Self {
            tool,
            timeout,
            grace: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.tool.clone(), config.info_timeout).with_grace(config.termination_grace)
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn build_args(&self, url: &str, platform: Platform) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        args.extend(profile_args(platform));
        args.push(url.to_string());
        args
    }

    /// Map the tool's JSON document into a `MediaInfo`.
    pub fn parse_json(stdout: &[u8], platform: Platform) -> Option<MediaInfo> {
        let text = String::from_utf8_lossy(stdout);
        let text = text.trim();
        let json: Value = serde_json::from_str(text)
            .or_else(|_| serde_json::from_str(text.lines().next().unwrap_or_default()))
            .ok()?;
        if !json.is_object() {
            return None;
        }

        let non_empty = |key: &str| {
            json[key]
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let duration_seconds = json["duration"]
            .as_f64()
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.round() as u64);

        let format_count = json["formats"].as_array().map(Vec::len).unwrap_or(1);

        Some(MediaInfo {
            title: non_empty("title").unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
            description: truncate_utf16(json["description"].as_str().unwrap_or(""), DESCRIPTION_LIMIT),
            duration_seconds,
            uploader: non_empty("uploader")
                .or_else(|| non_empty("channel"))
                .unwrap_or_else(|| UNKNOWN_UPLOADER.to_string()),
            thumbnail_url: non_empty("thumbnail"),
            format_count,
            platform,
        })
    }
}

#[async_trait]
impl InfoExtractor for CliInfoExtractor {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn extract(&self, url: &str, platform: Platform) -> MediaInfo {
        let args = self.build_args(url, platform);
        info!(%url, %platform, "fetching media info");

        let output = match run_output_with_timeout(&self.tool, &args, self.timeout, self.grace).await {
            Ok(output) => output,
            Err(e) => {
                warn!(%url, error = %e, "metadata fetch failed, using placeholder");
                return MediaInfo::fallback(platform);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                %url,
                exit_code = ?output.status.code(),
                stderr = %stderr.trim(),
                "metadata fetch exited with an error, using placeholder"
            );
            return MediaInfo::fallback(platform);
        }

        match Self::parse_json(&output.stdout, platform) {
            Some(info) => {
                debug!(title = %info.title, formats = info.format_count, "media info parsed");
                info
            }
            None => {
                warn!(%url, "metadata output was not a JSON document, using placeholder");
                MediaInfo::fallback(platform)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_recognised_fields() {
        let long_description = "d".repeat(500);
        let json = serde_json::json!({
            "title": "Launch day",
            "description": long_description,
            "duration": 212.6,
            "channel": "Rocket Lab",
            "thumbnail": "https://i.ytimg.com/vi/x/hq.jpg",
            "formats": [{}, {}, {}],
        });
        let info = CliInfoExtractor::parse_json(json.to_string().as_bytes(), Platform::Youtube).unwrap();
        assert_eq!(info.title, "Launch day");
        assert_eq!(info.description.len(), DESCRIPTION_LIMIT);
        assert_eq!(info.duration_seconds, Some(213));
        assert_eq!(info.uploader, "Rocket Lab");
        assert_eq!(info.thumbnail_url.as_deref(), Some("https://i.ytimg.com/vi/x/hq.jpg"));
        assert_eq!(info.format_count, 3);
        assert_eq!(info.platform, Platform::Youtube);
    }

    #[test]
    fn missing_fields_take_placeholders() {
        let info = CliInfoExtractor::parse_json(br#"{"title": "  "}"#, Platform::Tiktok).unwrap();
        assert_eq!(info.title, PLACEHOLDER_TITLE);
        assert_eq!(info.uploader, UNKNOWN_UPLOADER);
        assert_eq!(info.format_count, 1);
        assert!(info.duration_seconds.is_none());
        assert!(info.thumbnail_url.is_none());
    }

    #[test]
    fn rejects_non_documents() {
        assert!(CliInfoExtractor::parse_json(b"not json", Platform::Generic).is_none());
        assert!(CliInfoExtractor::parse_json(b"[1, 2]", Platform::Generic).is_none());
    }

    #[test]
    fn youtube_metadata_requests_carry_profile_args() {
        let extractor = CliInfoExtractor::new(ToolCommand::new("yt-dlp"), Duration::from_secs(30));
        let args = extractor.build_args("https://youtu.be/x", Platform::Youtube);
        assert_eq!(&args[..3], &["--dump-json", "--no-playlist", "--no-warnings"]);
        assert!(args.contains(&"youtube:player_client=android".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/x"));
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::io::Write;

        fn fake_tool(script: &str) -> (tempfile::NamedTempFile, ToolCommand) {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "{}", script).unwrap();
            file.flush().unwrap();
            let tool = ToolCommand::new("sh").with_leading_args([file.path().to_string_lossy().to_string()]);
            (file, tool)
        }

        #[tokio::test]
        async fn parses_tool_output() {
            let (_script, tool) = fake_tool(r#"echo '{"title":"Clip","uploader":"Me","formats":[{}]}'"#);
            let extractor = CliInfoExtractor::new(tool, Duration::from_secs(5));
            let info = extractor.extract("https://www.tiktok.com/@me/video/1", Platform::Tiktok).await;
            assert_eq!(info.title, "Clip");
            assert_eq!(info.uploader, "Me");
            assert_eq!(info.format_count, 1);
        }

        #[tokio::test]
        async fn failing_tool_degrades_to_placeholder() {
            let (_script, tool) = fake_tool("echo 'ERROR: Private video' >&2; exit 1");
            let extractor = CliInfoExtractor::new(tool, Duration::from_secs(5));
            let info = extractor.extract("https://youtu.be/x", Platform::Youtube).await;
            assert_eq!(info, MediaInfo::fallback(Platform::Youtube));
        }

        #[tokio::test]
        async fn hung_tool_degrades_to_placeholder_within_ceiling() {
            let (_script, tool) = fake_tool("exec sleep 30");
            let extractor = CliInfoExtractor::new(tool, Duration::from_millis(300))
                .with_grace(Duration::from_millis(500));
            let started = std::time::Instant::now();
            let info = extractor.extract("https://youtu.be/x", Platform::Youtube).await;
            assert_eq!(info.title, PLACEHOLDER_TITLE);
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn missing_tool_degrades_to_placeholder() {
            let extractor = CliInfoExtractor::new(
                ToolCommand::new("/nonexistent/yt-dlp"),
                Duration::from_secs(1),
            );
            let info = extractor.extract("https://youtu.be/x", Platform::Youtube).await;
            assert_eq!(info, MediaInfo::fallback(Platform::Youtube));
        }
    }
}
