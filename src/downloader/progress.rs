// yt-dlp stdout parsing
//
// The tool is run with `--newline`, so every progress update arrives as its
// own line. Lines that are not recognised are ignored.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use super::diagnostics::is_size_limit_abort;
use super::models::DownloadProgress;

lazy_static! {
    // [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)
    static ref PROGRESS_RE: Regex = Regex::new(
        r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*\w+)\s+(?:at|in)\s+(\S+(?:\s*\w+/s)?)(?:\s+ETA\s+(\S+))?(?:\s+\(frag\s+(\d+)/(\d+)\))?"
    ).unwrap();
    static ref PERCENT_RE: Regex = Regex::new(r"^\s*\[download\]\s+(\d+\.?\d*)%").unwrap();
    static ref DEST_RE: Regex = Regex::new(r"^\s*\[(\w+)\]\s+Destination:\s+(.+?)\s*$").unwrap();
    static ref MERGE_RE: Regex = Regex::new(r#"^\s*\[Merger\]\s+Merging formats into\s+"?(.+?)"?\s*$"#).unwrap();
    static ref ALREADY_RE: Regex = Regex::new(r"^\s*\[download\]\s+(.+?) has already been downloaded").unwrap();
}

/// Something the tool reported on stdout
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Bytes are flowing
    Transfer { percent: f32, status: String },
    /// The tool announced the file it is writing (base name only)
    Destination { stage: String, filename: String },
    /// Streams are being merged into `filename`
    Merging { filename: String },
    /// The target already exists and will not be fetched again
    AlreadyDownloaded { filename: String },
    /// `--max-filesize` made the tool skip the file
    SizeLimitExceeded,
}

impl ProgressEvent {
    /// Whether this event proves the transfer has started, moving the job
    /// from the idle window into the active window.
    pub fn starts_transfer(&self) -> bool {
        matches!(self, Self::Transfer { .. } | Self::Merging { .. })
    }

    /// Artifact file name this event names, if any.
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Destination { filename, .. }
            | Self::Merging { filename }
            | Self::AlreadyDownloaded { filename } => Some(filename),
            _ => None,
        }
    }

    pub fn to_progress(&self) -> DownloadProgress {
        let (percent, status) = match self {
            Self::Transfer { percent, status } => (*percent, status.clone()),
            Self::Destination { filename, .. } => (0.0, format!("📥 Starting: {}", short_name(filename))),
            Self::Merging { .. } => (99.0, "🔄 Merging video and audio...".to_string()),
            Self::AlreadyDownloaded { .. } => (100.0, "✅ File already downloaded".to_string()),
            Self::SizeLimitExceeded => (0.0, "File exceeds the size limit".to_string()),
        };
        DownloadProgress { percent, status }
    }
}

/// Parse one stdout line into an event.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let size = caps.get(2).map(|m| m.as_str()).unwrap_or("?");
        let speed = caps.get(3).map(|m| m.as_str()).unwrap_or("?");
        let eta = caps.get(4).map(|m| m.as_str()).unwrap_or("");
        let frag = caps.get(5).zip(caps.get(6));

        let status = match frag {
            Some((current, total)) => format!(
                "⬇️ {:.1}% of {} @ {} ETA {} (frag {}/{})",
                percent,
                size,
                speed,
                eta,
                current.as_str(),
                total.as_str()
            ),
            None if !eta.is_empty() => format!("⬇️ {:.1}% of {} @ {} ETA {}", percent, size, speed, eta),
            None => format!("⬇️ {:.1}% of {} @ {}", percent, size, speed),
        };
        return Some(ProgressEvent::Transfer { percent, status });
    }

    if let Some(caps) = PERCENT_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        return Some(ProgressEvent::Transfer {
            percent,
            status: format!("⬇️ {:.1}%", percent),
        });
    }

    if is_size_limit_abort(line) {
        return Some(ProgressEvent::SizeLimitExceeded);
    }

    if let Some(caps) = MERGE_RE.captures(line) {
        return Some(ProgressEvent::Merging {
            filename: base_name(caps.get(1)?.as_str()),
        });
    }

    if let Some(caps) = DEST_RE.captures(line) {
        return Some(ProgressEvent::Destination {
            stage: caps.get(1)?.as_str().to_string(),
            filename: base_name(caps.get(2)?.as_str()),
        });
    }

    if let Some(caps) = ALREADY_RE.captures(line) {
        return Some(ProgressEvent::AlreadyDownloaded {
            filename: base_name(caps.get(1)?.as_str()),
        });
    }

    None
}

/// Strip directories; progress never carries server paths.
fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

fn short_name(filename: &str) -> String {
    let short: String = filename.chars().take(50).collect();
    if short.len() < filename.len() {
        format!("{}...", short)
    } else {
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fragment_progress() {
        let event = parse_progress_line(
            "[download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)",
        )
        .unwrap();
        match event {
            ProgressEvent::Transfer { percent, ref status } => {
                assert!((percent - 12.5).abs() < f32::EPSILON);
                assert!(status.contains("frag 56/454"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(event.starts_transfer());
    }

    #[test]
    fn bare_percentage_counts_as_transfer() {
        let event = parse_progress_line("[download] 100% of    3.00MiB in 00:00:01 at 2.1MiB/s").unwrap();
        assert!(event.starts_transfer());
        assert_eq!(event.to_progress().percent, 100.0);

        let event = parse_progress_line("[download]   0.0% of Unknown size").unwrap();
        assert!(event.starts_transfer());
    }

    #[test]
    fn destination_is_reduced_to_base_name() {
        let event = parse_progress_line("[download] Destination: /tmp/downloads/clip_1_abc.webm").unwrap();
        assert_eq!(event.filename(), Some("clip_1_abc.webm"));
        assert!(!event.starts_transfer());
        assert!(!event.to_progress().status.contains("/tmp"));

        let event = parse_progress_line("[ExtractAudio] Destination: /tmp/downloads/clip_1_abc.m4a").unwrap();
        assert!(matches!(event, ProgressEvent::Destination { ref stage, .. } if stage == "ExtractAudio"));
    }

    #[test]
    fn merge_and_already_downloaded() {
        let merge = parse_progress_line(r#"[Merger] Merging formats into "/tmp/downloads/a_1_b.mp4""#).unwrap();
        assert_eq!(merge.filename(), Some("a_1_b.mp4"));
        assert!(merge.starts_transfer());

        let done = parse_progress_line("[download] /tmp/downloads/a_1_b.mp4 has already been downloaded").unwrap();
        assert_eq!(done.filename(), Some("a_1_b.mp4"));
    }

    #[test]
    fn detects_size_limit_skip() {
        let event =
            parse_progress_line("[download] File is larger than max-filesize (300000 bytes > 200 bytes). Aborting.")
                .unwrap();
        assert_eq!(event, ProgressEvent::SizeLimitExceeded);
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress_line("").is_none());
    }
}
