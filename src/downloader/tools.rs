use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::downloader::utils::run_output_with_timeout;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version",
        }
    }
}

/// How to launch the extraction tool: a program plus optional leading
/// arguments (e.g. `python3 -m yt_dlp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Run yt-dlp as a Python module through the given interpreter.
    pub fn python_module(interpreter: impl Into<PathBuf>) -> Self {
        Self::new(interpreter).with_leading_args(["-m", "yt_dlp"])
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Short name for messages; never the full path.
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| ToolType::YtDlp.as_str().to_string())
    }

    /// A command with the supervision settings every invocation shares:
    /// no stdin, own process group, killed if the handle is dropped.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .stdin(Stdio::null())
            .env("PYTHONIOENCODING", "utf-8")
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

impl Default for ToolCommand {
    fn default() -> Self {
        Self::new(find_ytdlp())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// Find yt-dlp in common install locations, falling back to `PATH` lookup.
pub fn find_ytdlp() -> PathBuf {
    find_binary(ToolType::YtDlp.as_str()).unwrap_or_else(|| PathBuf::from("yt-dlp"))
}

fn candidate_paths(binary_name: &str) -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(format!("/opt/homebrew/bin/{}", binary_name)),
        PathBuf::from(format!("/usr/local/bin/{}", binary_name)),
        PathBuf::from(format!("/usr/bin/{}", binary_name)),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".local").join("bin").join(binary_name));
    }
    paths
}

fn find_binary(binary_name: &str) -> Option<PathBuf> {
    if let Some(found) = candidate_paths(binary_name).into_iter().find(|p| p.is_file()) {
        return Some(found);
    }

    let path_var = std::env::var_os("PATH").unwrap_or_else(OsString::new);
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary_name))
        .find(|p| p.is_file())
}

/// Reports which external tools are usable on this host.
pub struct ToolManager {
    ytdlp: ToolCommand,
    ffmpeg: Option<PathBuf>,
    probe_timeout: Duration,
}

impl ToolManager {
    pub fn new(ytdlp: ToolCommand, ffmpeg: Option<PathBuf>) -> Self {
        Self {
            ytdlp,
            ffmpeg,
            probe_timeout: Duration::from_secs(10),
        }
    }

    pub async fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let command = match tool_type {
            ToolType::YtDlp => Some(self.ytdlp.clone()),
            ToolType::Ffmpeg => self
                .ffmpeg
                .clone()
                .or_else(|| find_binary(ToolType::Ffmpeg.as_str()))
                .map(ToolCommand::new),
        };

        let (path, version) = match command {
            Some(command) => {
                let version = self.get_version(&command, tool_type).await;
                (Some(command.program.to_string_lossy().to_string()), version)
            }
            None => (None, None),
        };

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: version.is_some(),
            version,
            path,
        }
    }

    pub async fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp).await,
            self.get_tool_info(ToolType::Ffmpeg).await,
        ]
    }

    async fn get_version(&self, command: &ToolCommand, tool_type: ToolType) -> Option<String> {
        let args = vec![tool_type.version_arg().to_string()];
        match run_output_with_timeout(command, &args, self.probe_timeout, Duration::from_secs(1)).await {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            Ok(output) => {
                debug!(tool = tool_type.as_str(), status = %output.status, "version probe failed");
                None
            }
            Err(e) => {
                debug!(tool = tool_type.as_str(), error = %e, "version probe failed");
                None
            }
        }
    }
}
