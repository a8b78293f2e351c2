// FormatSelector - single source of truth for quality semantics
//
// Maps a (format, quality) pair to the yt-dlp `--format` expression and the
// container extension the artifact is expected to end up with. Every chain
// is ordered by preference and ends in an unconstrained alternative, so a
// request never fails only because no stream matches the preferred container.

use serde::Serialize;

use super::models::{MediaFormat, Quality};

/// Container for audio-only artifacts
pub const AUDIO_EXTENSION: &str = "m4a";

/// Container for video artifacts
pub const VIDEO_EXTENSION: &str = "mp4";

/// Audio: m4a first, then mp3, then any audio, then whatever is best overall.
const AUDIO_SELECTOR: &str = "bestaudio[ext=m4a]/bestaudio[ext=mp3]/bestaudio/best[ext=m4a]/best";

/// Video tiers, highest to lowest.
const VIDEO_TIERS: [(Quality, &str); 5] = [
    (Quality::Highest, "best[ext=mp4]/best[height<=2160]/best"),
    (
        Quality::High,
        "best[height<=1080][ext=mp4]/best[height<=1080]/best[ext=mp4]/best",
    ),
    (
        Quality::Medium,
        "best[height<=720][ext=mp4]/best[height<=720]/best[ext=mp4]/best",
    ),
    (
        Quality::Low,
        "best[height<=480][ext=mp4]/best[height<=480]/best[ext=mp4]/best",
    ),
    (Quality::Lowest, "worst[ext=mp4]/worst"),
];

/// Resolved selector and predicted extension for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatPolicy {
    /// yt-dlp `--format` expression
    pub selector: &'static str,
    /// Extension the artifact is expected to carry
    pub extension: &'static str,
}

impl FormatPolicy {
    /// Whether the tool must be asked to extract audio after download.
    pub fn extracts_audio(&self) -> bool {
        self.extension == AUDIO_EXTENSION
    }

    /// The `/`-separated alternatives, in preference order.
    pub fn alternatives(&self) -> impl Iterator<Item = &'static str> {
        self.selector.split('/')
    }
}

/// Format selector with fixed quality tiers
pub struct FormatSelector;

impl FormatSelector {
    /// Resolve the format policy for a request. Pure and deterministic.
    pub fn resolve(format: MediaFormat, quality: Quality) -> FormatPolicy {
        match format {
            MediaFormat::Audio => FormatPolicy {
                selector: AUDIO_SELECTOR,
                extension: AUDIO_EXTENSION,
            },
            MediaFormat::Video => FormatPolicy {
                selector: Self::video_selector(quality),
                extension: VIDEO_EXTENSION,
            },
        }
    }

    fn video_selector(quality: Quality) -> &'static str {
        VIDEO_TIERS
            .iter()
            .find(|(tier, _)| *tier == quality)
            .or_else(|| VIDEO_TIERS.first())
            .map(|(_, selector)| *selector)
            .unwrap_or("best")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_policies() -> Vec<FormatPolicy> {
        let mut policies = Vec::new();
        for format in [MediaFormat::Video, MediaFormat::Audio] {
            for quality in Quality::ALL {
                policies.push(FormatSelector::resolve(format, quality));
            }
        }
        policies
    }

    #[test]
    fn resolve_is_deterministic() {
        for format in [MediaFormat::Video, MediaFormat::Audio] {
            for quality in Quality::ALL {
                assert_eq!(
                    FormatSelector::resolve(format, quality),
                    FormatSelector::resolve(format, quality)
                );
            }
        }
    }

    #[test]
    fn every_chain_ends_unconstrained() {
        for policy in all_policies() {
            assert!(!policy.selector.is_empty());
            let last = policy.alternatives().last().unwrap();
            assert!(!last.is_empty());
            assert!(!last.contains('['), "{} ends constrained", policy.selector);
        }
    }

    #[test]
    fn audio_ignores_quality_and_prefers_m4a() {
        for quality in Quality::ALL {
            let policy = FormatSelector::resolve(MediaFormat::Audio, quality);
            assert_eq!(policy.extension, "m4a");
            assert!(policy.extracts_audio());
            assert_eq!(policy.alternatives().next(), Some("bestaudio[ext=m4a]"));
        }
    }

    #[test]
    fn video_tiers_cap_height() {
        let high = FormatSelector::resolve(MediaFormat::Video, Quality::High);
        assert!(high.selector.starts_with("best[height<=1080]"));
        let medium = FormatSelector::resolve(MediaFormat::Video, Quality::Medium);
        assert!(medium.selector.contains("height<=720"));
        let low = FormatSelector::resolve(MediaFormat::Video, Quality::Low);
        assert!(low.selector.contains("height<=480"));
        let lowest = FormatSelector::resolve(MediaFormat::Video, Quality::Lowest);
        assert!(lowest.selector.starts_with("worst"));
        assert_eq!(lowest.extension, "mp4");
        assert!(!lowest.extracts_audio());
    }

    #[test]
    fn unknown_quality_uses_highest_tier() {
        assert_eq!(
            FormatSelector::resolve(MediaFormat::Video, Quality::parse_lenient("8k-hdr")),
            FormatSelector::resolve(MediaFormat::Video, Quality::Highest)
        );
        assert_eq!(
            FormatSelector::resolve(MediaFormat::Video, Quality::parse_lenient("720p")),
            FormatSelector::resolve(MediaFormat::Video, Quality::Medium)
        );
    }
}
