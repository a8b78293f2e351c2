// Helper functions shared by the metadata fetcher and the orchestrator

use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::downloader::errors::DownloadError;
use crate::downloader::tools::ToolCommand;

/// Base name used when a title sanitizes to nothing.
pub const FALLBACK_FILENAME: &str = "download";

/// Longest base name `sanitize_filename` produces, in characters.
pub const MAX_FILENAME_CHARS: usize = 100;

/// Turn an untrusted title into a filesystem-safe base name.
///
/// Only ASCII word characters, whitespace, `-`, `_`, `.`, `(` and `)` survive;
/// `..` sequences and leading dots are removed, whitespace runs become a single
/// underscore and the result is capped at 100 characters. Never returns an
/// empty string.
pub fn sanitize_filename(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| {
            c.is_ascii_alphanumeric()
                || c.is_whitespace()
                || matches!(c, '_' | '-' | '.' | '(' | ')')
        })
        .collect();

    // The whitelist above already excludes `<>:"/\|?*` and control characters.
    let without_traversal = kept.replace("..", "");
    let without_leading_dots = without_traversal.trim_start_matches('.');

    let mut collapsed = String::with_capacity(without_leading_dots.len());
    let mut previous_underscore = false;
    for c in without_leading_dots.chars() {
        let c = if c.is_whitespace() { '_' } else { c };
        if c == '_' {
            if previous_underscore {
                continue;
            }
            previous_underscore = true;
        } else {
            previous_underscore = false;
        }
        collapsed.push(c);
    }

    let truncated: String = collapsed.chars().take(MAX_FILENAME_CHARS).collect();
    let trimmed = truncated.trim_end_matches('_');

    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Truncate to at most `limit` UTF-16 code units without splitting a character.
pub fn truncate_utf16(s: &str, limit: usize) -> String {
    let mut units = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        units += c.len_utf16();
        if units > limit {
            break;
        }
        end = idx + c.len_utf8();
    }
    s[..end].to_string()
}

/// Format file size for display ("0 Bytes", "1.5 KB", "12.34 MB")
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rounded, UNITS[unit])
}

/// Run the tool to completion with a hard time limit, capturing its output.
///
/// Spawn failures map to `ToolNotFound`; exceeding `limit` terminates the
/// process (see `terminate`) and yields `NoResponse`.
pub async fn run_output_with_timeout(
    tool: &ToolCommand,
    args: &[String],
    limit: Duration,
    grace: Duration,
) -> Result<Output, DownloadError> {
    let mut child = tool
        .command()
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| DownloadError::ToolNotFound {
            tool: tool.name(),
            source,
        })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::io("capture stdout", io::Error::other("stdout not piped")))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::io("capture stderr", io::Error::other("stderr not piped")))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(limit, child.wait()).await {
        Ok(status) => {
            let status = status.map_err(|e| DownloadError::io("wait for the media tool", e))?;
            // A grandchild may still hold the pipes open; never wait on it forever.
            let stdout = collect_pipe(stdout_task, grace).await?;
            let stderr = collect_pipe(stderr_task, grace).await?;
            Ok(Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            warn!(timeout_secs = limit.as_secs_f64(), "media tool timed out, terminating");
            terminate(&mut child, grace).await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::NoResponse { after: limit })
        }
    }
}

async fn collect_pipe(
    task: tokio::task::JoinHandle<io::Result<Vec<u8>>>,
    grace: Duration,
) -> Result<Vec<u8>, DownloadError> {
    let abort = task.abort_handle();
    match timeout(grace, task).await {
        Ok(Ok(read)) => read.map_err(|e| DownloadError::io("read media tool output", e)),
        Ok(Err(join)) => Err(DownloadError::io("read media tool output", io::Error::other(join))),
        Err(_) => {
            abort.abort();
            debug!("output pipe still open after exit, dropping remainder");
            Ok(Vec::new())
        }
    }
}

/// Stop a child process: graceful signal first, forced kill after `grace`.
///
/// Safe to call on a process that already exited.
pub async fn terminate(child: &mut Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    if !send_terminate(child) {
        force_kill(child).await;
        return;
    }

    match timeout(grace, child.wait()).await {
        Ok(_) => debug!("media tool exited after termination signal"),
        Err(_) => {
            warn!(grace_secs = grace.as_secs_f64(), "media tool ignored termination signal, killing");
            force_kill(child).await;
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> bool {
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    let pid = Pid::from_raw(pid as i32);
    // The tool runs in its own process group so helpers like ffmpeg go down with it.
    killpg(pid, Signal::SIGTERM)
        .or_else(|_| kill(pid, Signal::SIGTERM))
        .is_ok()
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> bool {
    child.start_kill().is_ok()
}

async fn force_kill(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "kill after termination failed");
    }
}
