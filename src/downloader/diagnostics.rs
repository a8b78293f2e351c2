// Failure diagnostics - maps yt-dlp stderr to classified errors
//
// The tool's wording is not a contract, so this is a best-effort classifier:
// an ordered rule table evaluated top to bottom, first match wins. More
// specific phrases must precede the generic ones they contain (e.g.
// "requested format is not available" before "not available").

use lazy_static::lazy_static;
use regex::Regex;

use super::errors::{DownloadError, ErrorKind};

/// Longest diagnostic line surfaced to callers
const MAX_DETAIL_CHARS: usize = 300;

/// One (patterns, kind) entry of the classifier table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierRule {
    /// Lowercase substrings; any one of them triggers the rule
    pub patterns: &'static [&'static str],
    pub kind: ErrorKind,
    pub message: &'static str,
}

pub const CLASSIFIER_RULES: &[ClassifierRule] = &[
    ClassifierRule {
        patterns: &["larger than max-filesize"],
        kind: ErrorKind::TooLarge,
        message: "File is too large to download",
    },
    ClassifierRule {
        patterns: &[
            "private video",
            "video is private",
            "sign in if you've been granted access",
        ],
        kind: ErrorKind::Unavailable,
        message: "Cannot download private video",
    },
    ClassifierRule {
        patterns: &["confirm you're not a bot", "confirm you’re not a bot"],
        kind: ErrorKind::AccessDenied,
        message: "Request was flagged as automated - try again later",
    },
    ClassifierRule {
        patterns: &[
            "sign in to confirm your age",
            "age-restricted",
            "age restricted",
            "sign in to confirm",
            "login required",
            "requires authentication",
        ],
        kind: ErrorKind::Unavailable,
        message: "Video requires sign-in or is age-restricted",
    },
    ClassifierRule {
        patterns: &[
            "not available in your country",
            "not available in your region",
            "blocked in your country",
            "geo restriction",
            "geo-restricted",
            "geo restricted",
        ],
        kind: ErrorKind::Unavailable,
        message: "Video is not available in your region",
    },
    ClassifierRule {
        patterns: &["drm protected", "drm-protected", "widevine"],
        kind: ErrorKind::Unavailable,
        message: "Content is DRM-protected and cannot be downloaded",
    },
    ClassifierRule {
        patterns: &["no video formats found", "requested format is not available"],
        kind: ErrorKind::Unavailable,
        message: "No downloadable formats found",
    },
    ClassifierRule {
        patterns: &[
            "video unavailable",
            "has been removed",
            "no longer available",
            "not available",
            "does not exist",
            "http error 404",
        ],
        kind: ErrorKind::Unavailable,
        message: "Video is unavailable or private",
    },
    ClassifierRule {
        patterns: &["http error 429", "too many requests", "rate limit", "rate-limit"],
        kind: ErrorKind::AccessDenied,
        message: "Rate limited by the platform - try again later",
    },
    ClassifierRule {
        patterns: &[
            "http error 403",
            "http error 401",
            "forbidden",
            "access denied",
            "permission denied",
        ],
        kind: ErrorKind::AccessDenied,
        message: "Access denied - video may be restricted",
    },
    ClassifierRule {
        patterns: &["unsupported url"],
        kind: ErrorKind::Validation,
        message: "Unsupported URL or platform",
    },
];

lazy_static! {
    static ref ERROR_LINE_RE: Regex = Regex::new(r"ERROR:\s*(.+?)\s*(?:\n|$)").unwrap();
    static ref PATH_RE: Regex = Regex::new(r#"(^|[\s'"(=])(/[^\s'")]+)"#).unwrap();
}

/// First rule in table order whose pattern occurs in `text`.
pub fn classify(text: &str) -> Option<&'static ClassifierRule> {
    let lower = text.to_lowercase();
    CLASSIFIER_RULES
        .iter()
        .find(|rule| rule.patterns.iter().any(|p| lower.contains(p)))
}

/// Best-effort diagnostic line: the first `ERROR:` message, with filesystem
/// paths redacted and length capped.
pub fn extract_error_line(stderr: &str) -> Option<String> {
    let caps = ERROR_LINE_RE.captures(stderr)?;
    let line = caps.get(1)?.as_str();
    let redacted = PATH_RE.replace_all(line, "$1<path>");
    let detail: String = redacted.chars().take(MAX_DETAIL_CHARS).collect();
    if detail.is_empty() {
        None
    } else {
        Some(detail)
    }
}

/// Build the single classified error for a non-zero exit.
pub fn failure_from_exit(exit_code: Option<i32>, stderr: &str, max_filesize: &str) -> DownloadError {
    if let Some(rule) = classify(stderr) {
        return match rule.kind {
            ErrorKind::TooLarge => DownloadError::TooLarge {
                limit: max_filesize.to_string(),
            },
            ErrorKind::AccessDenied => DownloadError::AccessDenied(rule.message.to_string()),
            ErrorKind::Validation => DownloadError::InvalidUrl(rule.message.to_string()),
            _ => DownloadError::Unavailable(rule.message.to_string()),
        };
    }

    let message = extract_error_line(stderr).unwrap_or_else(|| match exit_code {
        Some(code) => format!("Download failed with exit code {}", code),
        None => "Download failed: media tool was terminated by a signal".to_string(),
    });

    DownloadError::Failed { exit_code, message }
}

/// Whether a stdout line reports that the tool skipped the file for size.
pub fn is_size_limit_abort(line: &str) -> bool {
    line.to_lowercase().contains("larger than max-filesize")
}
