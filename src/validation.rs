// URL validation - the gate in front of every download
//
// Accepts absolute http(s) URLs on a supported platform and tags them with
// that platform. Nothing behind this gate re-checks URL syntax.

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::Platform;

/// Host suffixes per platform, matched on domain boundaries.
const PLATFORM_DOMAINS: &[(Platform, &[&str])] = &[
    (Platform::Youtube, &["youtube.com", "youtu.be"]),
    (Platform::Tiktok, &["tiktok.com"]),
    (Platform::Instagram, &["instagram.com"]),
    (Platform::Facebook, &["facebook.com", "fb.watch"]),
    (Platform::Twitter, &["twitter.com", "x.com"]),
    (Platform::Pinterest, &["pinterest.com", "pin.it"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid URL format")]
    InvalidFormat,

    #[error("Unsupported URL. Supported platforms: {}", supported_platforms())]
    Unsupported { hostname: String },
}

impl From<ValidationError> for DownloadError {
    fn from(err: ValidationError) -> Self {
        DownloadError::InvalidUrl(err.to_string())
    }
}

/// A URL that passed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedUrl {
    pub clean_url: String,
    pub hostname: String,
    pub platform: Platform,
}

pub fn validate_url(raw: &str) -> Result<ValidatedUrl, ValidationError> {
    let clean_url = raw.trim();
    let parsed = Url::parse(clean_url).map_err(|_| ValidationError::InvalidFormat)?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidFormat);
    }
    let hostname = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(ValidationError::InvalidFormat)?
        .to_ascii_lowercase();

    let platform = platform_for_host(&hostname).ok_or_else(|| ValidationError::Unsupported {
        hostname: hostname.clone(),
    })?;

    Ok(ValidatedUrl {
        clean_url: clean_url.to_string(),
        hostname,
        platform,
    })
}

/// Platform owning `hostname`, if any.
pub fn platform_for_host(hostname: &str) -> Option<Platform> {
    let host = hostname.trim_end_matches('.');
    PLATFORM_DOMAINS
        .iter()
        .find(|(_, domains)| {
            domains
                .iter()
                .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
        })
        .map(|(platform, _)| *platform)
}

fn supported_platforms() -> String {
    PLATFORM_DOMAINS
        .iter()
        .map(|(platform, _)| platform.display_name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_platform_hosts() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", Platform::Youtube),
            ("https://youtu.be/dQw4w9WgXcQ", Platform::Youtube),
            ("https://music.youtube.com/watch?v=x", Platform::Youtube),
            ("https://vm.tiktok.com/ZM123/", Platform::Tiktok),
            ("https://www.instagram.com/reel/abc/", Platform::Instagram),
            ("https://fb.watch/abc/", Platform::Facebook),
            ("https://x.com/user/status/1", Platform::Twitter),
            ("http://mobile.twitter.com/user/status/1", Platform::Twitter),
            ("https://pin.it/abc", Platform::Pinterest),
        ];
        for (url, platform) in cases {
            assert_eq!(validate_url(url).unwrap().platform, platform, "{}", url);
        }
    }

    #[test]
    fn trims_and_lowercases_host() {
        let validated = validate_url("  https://WWW.TikTok.com/@a/video/1  ").unwrap();
        assert_eq!(validated.clean_url, "https://WWW.TikTok.com/@a/video/1");
        assert_eq!(validated.hostname, "www.tiktok.com");
    }

    #[test]
    fn rejects_malformed_and_non_http_urls() {
        for url in ["", "not a url", "youtube.com/watch?v=x", "ftp://youtube.com/x", "file:///etc/passwd"] {
            assert_eq!(validate_url(url), Err(ValidationError::InvalidFormat), "{}", url);
        }
    }

    #[test]
    fn rejects_lookalike_hosts() {
        for url in ["https://dropbox.com/s/x", "https://notyoutube.com/watch", "https://example.com"] {
            let err = validate_url(url).unwrap_err();
            assert!(matches!(err, ValidationError::Unsupported { .. }), "{}", url);
        }
    }

    #[test]
    fn unsupported_message_lists_platforms() {
        let err = validate_url("https://vimeo.com/1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported URL. Supported platforms: YouTube, TikTok, Instagram, Facebook, X/Twitter, Pinterest"
        );
        let download: DownloadError = err.into();
        assert_eq!(download.status_hint(), 400);
    }
}
