// Error types for the download pipeline

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a failed job, stable enough for callers to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or unsupported URL, rejected before any subprocess runs
    Validation,
    /// No transfer started within the idle window
    IdleTimeout,
    /// Transfer started but did not finish within the extended window
    StalledTransfer,
    /// Private, region-locked, sign-in-required or removed content
    Unavailable,
    /// Rate limiting or permission denial
    AccessDenied,
    /// Missing, empty or undersized output file
    ArtifactIntegrity,
    /// Source exceeds the configured maximum file size
    TooLarge,
    /// The extraction tool could not be started at all
    ToolingUnavailable,
    /// The caller gave up on the job
    Cancelled,
    /// Anything the stderr classifier did not recognise
    Unclassified,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::IdleTimeout => "idle_timeout",
            Self::StalledTransfer => "stalled_transfer",
            Self::Unavailable => "unavailable",
            Self::AccessDenied => "access_denied",
            Self::ArtifactIntegrity => "artifact_integrity",
            Self::TooLarge => "too_large",
            Self::ToolingUnavailable => "tooling_unavailable",
            Self::Cancelled => "cancelled",
            Self::Unclassified => "unclassified",
        }
    }

    /// HTTP status a routing layer would answer with for this kind.
    pub fn status_hint(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::IdleTimeout | Self::StalledTransfer => 408,
            Self::TooLarge => 413,
            Self::Unavailable => 404,
            Self::AccessDenied => 403,
            Self::Cancelled => 499,
            Self::ArtifactIntegrity | Self::ToolingUnavailable | Self::Unclassified => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified failure per failed job. Messages are user-facing and never
/// carry filesystem paths.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{0}")]
    InvalidUrl(String),

    #[error("Download timeout - server took too long to respond")]
    NoResponse { after: Duration },

    #[error("Download timeout - file too large or slow connection")]
    TooSlow { after: Duration },

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("Downloaded file not found")]
    ArtifactMissing,

    #[error("Downloaded file is empty")]
    ArtifactEmpty,

    #[error("Downloaded file is too small, likely corrupted")]
    ArtifactTooSmall { size: u64 },

    #[error("File is too large to download (limit {limit})")]
    TooLarge { limit: String },

    #[error("Failed to start {tool}. Make sure {tool} is installed")]
    ToolNotFound {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("Download cancelled")]
    Cancelled,

    #[error("{message}")]
    Failed {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("Download failed while trying to {operation}")]
    Io {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_) => ErrorKind::Validation,
            Self::NoResponse { .. } => ErrorKind::IdleTimeout,
            Self::TooSlow { .. } => ErrorKind::StalledTransfer,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::ArtifactMissing | Self::ArtifactEmpty | Self::ArtifactTooSmall { .. } => {
                ErrorKind::ArtifactIntegrity
            }
            Self::TooLarge { .. } => ErrorKind::TooLarge,
            Self::ToolNotFound { .. } => ErrorKind::ToolingUnavailable,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Failed { .. } | Self::Io { .. } => ErrorKind::Unclassified,
        }
    }

    pub fn status_hint(&self) -> u16 {
        self.kind().status_hint()
    }

    /// Raw exit code of the tool, for failures the classifier did not recognise.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Serializable failure counterpart of `DownloadResult`.
    pub fn to_descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            success: false,
            error: self.kind(),
            message: self.to_string(),
            status: self.status_hint(),
            exit_code: self.exit_code(),
        }
    }

    pub(crate) fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io { operation, source }
    }
}

/// Failure payload handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    pub success: bool,
    pub error: ErrorKind,
    pub message: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_failures_share_a_kind() {
        assert_eq!(DownloadError::ArtifactMissing.kind(), ErrorKind::ArtifactIntegrity);
        assert_eq!(DownloadError::ArtifactEmpty.kind(), ErrorKind::ArtifactIntegrity);
        assert_eq!(
            DownloadError::ArtifactTooSmall { size: 500 }.kind(),
            ErrorKind::ArtifactIntegrity
        );
    }

    #[test]
    fn timeouts_are_distinct() {
        let idle = DownloadError::NoResponse { after: Duration::from_secs(120) };
        let slow = DownloadError::TooSlow { after: Duration::from_secs(300) };
        assert_ne!(idle.kind(), slow.kind());
        assert_ne!(idle.to_string(), slow.to_string());
        assert_eq!(idle.status_hint(), 408);
    }

    #[test]
    fn tool_error_message_has_no_path() {
        let err = DownloadError::ToolNotFound {
            tool: "yt-dlp".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "/opt/bin/yt-dlp missing"),
        };
        assert_eq!(err.kind(), ErrorKind::ToolingUnavailable);
        assert!(!err.to_string().contains("/opt"));
    }

    #[test]
    fn descriptor_serializes_kind_in_snake_case() {
        let descriptor = DownloadError::AccessDenied("Access denied".to_string()).to_descriptor();
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "access_denied");
        assert_eq!(json["status"], 403);
        assert!(json.get("exitCode").is_none());
    }

    #[test]
    fn unclassified_descriptor_keeps_exit_code_next_to_error_line() {
        let err = DownloadError::Failed {
            exit_code: Some(2),
            message: "something odd happened".to_string(),
        };
        let descriptor = err.to_descriptor();
        assert_eq!(descriptor.error, ErrorKind::Unclassified);
        assert_eq!(descriptor.message, "something odd happened");
        assert_eq!(descriptor.exit_code, Some(2));

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["exitCode"], 2);
        assert_eq!(json["status"], 500);
    }
}
