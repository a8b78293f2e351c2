// Common data models for downloader

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Title used whenever metadata is missing or could not be fetched.
pub const PLACEHOLDER_TITLE: &str = "Media File";

/// Uploader used whenever metadata does not name one.
pub const UNKNOWN_UPLOADER: &str = "Unknown";

/// Longest description kept in a `MediaInfo`, in UTF-16 code units.
pub const DESCRIPTION_LIMIT: usize = 200;

/// Rejected request option (format, quality or platform).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {value}")]
pub struct InvalidOption {
    pub field: &'static str,
    pub value: String,
}

/// Source platform, as determined by the URL validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Tiktok,
    Instagram,
    Facebook,
    Twitter,
    Pinterest,
    Generic,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Tiktok => "tiktok",
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Twitter => "twitter",
            Self::Pinterest => "pinterest",
            Self::Generic => "generic",
        }
    }

    /// Name suitable for user-facing messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Youtube => "YouTube",
            Self::Tiktok => "TikTok",
            Self::Instagram => "Instagram",
            Self::Facebook => "Facebook",
            Self::Twitter => "X/Twitter",
            Self::Pinterest => "Pinterest",
            Self::Generic => "Generic",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = InvalidOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" => Ok(Self::Youtube),
            "tiktok" => Ok(Self::Tiktok),
            "instagram" => Ok(Self::Instagram),
            "facebook" => Ok(Self::Facebook),
            "twitter" | "x" => Ok(Self::Twitter),
            "pinterest" => Ok(Self::Pinterest),
            "generic" => Ok(Self::Generic),
            other => Err(InvalidOption {
                field: "platform",
                value: other.to_string(),
            }),
        }
    }
}

/// Requested artifact type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    #[default]
    Video,
    Audio,
}

impl MediaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaFormat {
    type Err = InvalidOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(InvalidOption {
                field: "format",
                value: other.to_string(),
            }),
        }
    }
}

/// Requested quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Highest,
    High,
    Medium,
    Low,
    Lowest,
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Self::Highest,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Lowest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Lowest => "lowest",
        }
    }

    /// Parse a quality value, falling back to `Highest` for anything unknown.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = InvalidOption;

    /// Accepts tier names and the resolution aliases used by older clients.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest" | "best" => Ok(Self::Highest),
            "high" | "1080p" => Ok(Self::High),
            "medium" | "720p" => Ok(Self::Medium),
            "low" | "480p" => Ok(Self::Low),
            "lowest" | "360p" => Ok(Self::Lowest),
            other => Err(InvalidOption {
                field: "quality",
                value: other.to_string(),
            }),
        }
    }
}

/// Download options supplied by the caller alongside a validated URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOptions {
    pub format: MediaFormat,
    pub quality: Quality,
    pub platform: Platform,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            format: MediaFormat::Video,
            quality: Quality::Highest,
            platform: Platform::Generic,
        }
    }
}

/// Immutable description of what to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub url: String,
    pub platform: Platform,
    pub format: MediaFormat,
    pub quality: Quality,
}

impl MediaRequest {
    pub fn new(url: impl Into<String>, options: DownloadOptions) -> Self {
        Self {
            url: url.into(),
            platform: options.platform,
            format: options.format,
            quality: options.quality,
        }
    }
}

/// Best-effort metadata about a piece of media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub title: String,
    pub description: String,
    pub duration_seconds: Option<u64>,
    pub uploader: String,
    pub thumbnail_url: Option<String>,
    pub format_count: usize,
    pub platform: Platform,
}

impl MediaInfo {
    /// Placeholder record returned when metadata cannot be fetched
    pub fn fallback(platform: Platform) -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            description: String::new(),
            duration_seconds: None,
            uploader: UNKNOWN_UPLOADER.to_string(),
            thumbnail_url: None,
            format_count: 1,
            platform,
        }
    }
}

/// Successful outcome of a download job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub success: bool,
    pub download_url: String,
    pub title: String,
    pub filename: String,
    pub size_bytes: u64,
    pub format: MediaFormat,
    pub quality: Quality,
    pub platform: Platform,
}

/// Download progress information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub percent: f32,
    pub status: String,
}

/// Lifecycle of a single download job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Preparing,
    Spawned,
    RunningIdle,
    RunningActive,
    Verifying,
    Succeeded,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobPhase) -> bool {
        use JobPhase::*;
        match (self, next) {
            (_, Failed) => !self.is_terminal(),
            (Preparing, Spawned) => true,
            (Spawned, RunningIdle) => true,
            (RunningIdle, RunningActive) => true,
            (RunningIdle | RunningActive, Verifying) => true,
            (Verifying, Succeeded) => true,
            _ => false,
        }
    }
}
