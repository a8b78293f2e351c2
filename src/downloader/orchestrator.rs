// Download orchestrator
//
// Turns one `MediaRequest` into one verified artifact on disk. Each job owns
// a unique output name (the job id is embedded in it), a single yt-dlp child
// process and a single deadline timer. The supervision loop is the only
// place that can stop the child, so a timeout, a cancellation and a normal
// exit all leave through the same cleanup path.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;

use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::diagnostics::failure_from_exit;
use super::errors::DownloadError;
use super::extractors::InfoExtractor;
use super::format_selector::{FormatPolicy, FormatSelector, AUDIO_EXTENSION};
use super::models::{DownloadResult, JobPhase, MediaInfo, MediaRequest};
use super::profiles::profile_args;
use super::progress::{parse_progress_line, ProgressEvent};
use super::traits::{NoopProgress, ProgressObserver};
use super::utils::{format_file_size, sanitize_filename, terminate};
use crate::config::ServiceConfig;

/// Characters of the title that make it into the artifact name
const TITLE_CHARS: usize = 50;

/// Stderr lines kept for classification
const STDERR_TAIL_LINES: usize = 100;

/// Base name (no extension) of a job's artifact: sanitized title, creation
/// time in milliseconds and the job token.
pub fn artifact_base_name(title: &str, timestamp_ms: i128, token: &str) -> String {
    let title: String = title.chars().take(TITLE_CHARS).collect();
    format!("{}_{}_{}", sanitize_filename(&title), timestamp_ms, token)
}

fn unix_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// Working state of one request. Dropped once the job reaches a terminal phase.
struct DownloadJob {
    job_id: Uuid,
    /// Job id as embedded in file names
    token: String,
    request: MediaRequest,
    info: MediaInfo,
    policy: FormatPolicy,
    /// Where the artifact is predicted to land
    output_path: PathBuf,
    /// `--output` template handed to the tool
    output_template: PathBuf,
    phase: JobPhase,
    started_at: Instant,
}

impl DownloadJob {
    fn new(job_id: Uuid, request: MediaRequest, info: MediaInfo, downloads_dir: &Path) -> Self {
        let policy = FormatSelector::resolve(request.format, request.quality);
        let token = job_id.simple().to_string();
        let base = artifact_base_name(&info.title, unix_millis(), &token);

        Self {
            job_id,
            output_path: downloads_dir.join(format!("{}.{}", base, policy.extension)),
            output_template: downloads_dir.join(format!("{}.%(ext)s", base)),
            token,
            request,
            info,
            policy,
            phase: JobPhase::Preparing,
            started_at: Instant::now(),
        }
    }

    fn advance(&mut self, next: JobPhase) {
        if !self.phase.can_transition_to(next) {
            warn!(job_id = %self.job_id, from = ?self.phase, to = ?next, "unexpected job phase transition");
        }
        debug!(job_id = %self.job_id, from = ?self.phase, to = ?next, "job phase");
        self.phase = next;
    }
}

/// Why the supervision loop ended
enum Stop {
    Exited(ExitStatus),
    IdleTimeout,
    ActiveTimeout,
    Cancelled,
    WaitFailed(io::Error),
}

/// What the tool has told us on stdout so far
#[derive(Default)]
struct StdoutState {
    transfer_started: bool,
    size_limit_hit: bool,
    reported_file: Option<String>,
}

impl StdoutState {
    /// Record one line. Returns true the first time a line proves that bytes
    /// are flowing.
    fn observe(&mut self, line: &str, job_id: Uuid, observer: &dyn ProgressObserver) -> bool {
        let Some(event) = parse_progress_line(line) else {
            return false;
        };
        if matches!(event, ProgressEvent::SizeLimitExceeded) {
            self.size_limit_hit = true;
        }
        if let Some(name) = event.filename() {
            self.reported_file = Some(name.to_string());
        }
        observer.on_progress(job_id, &event.to_progress());

        if event.starts_transfer() && !self.transfer_started {
            self.transfer_started = true;
            return true;
        }
        false
    }
}

/// Cleanup of last resort for a job whose future is dropped mid-run, as
/// happens when an HTTP client goes away. Kills the tool's whole process
/// group and deletes the job's files synchronously. `run` disarms it once
/// the job has a result.
struct JobGuard {
    job_id: Uuid,
    /// Process group of a child that has not been reaped yet
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
    dir: PathBuf,
    token: String,
    armed: bool,
}

impl JobGuard {
    fn new(job: &DownloadJob, child: &Child, dir: &Path) -> Self {
        Self {
            job_id: job.job_id,
            pgid: child.id(),
            dir: dir.to_path_buf(),
            token: job.token.clone(),
            armed: true,
        }
    }

    /// The child was reaped, so its group id may be reused from here on.
    fn child_reaped(&mut self) {
        self.pgid = None;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(job_id = %self.job_id, "download dropped before completion, cleaning up");

        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;
            let _ = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL);
        }
        remove_job_files_now(&self.dir, &self.token);
    }
}

pub struct Downloader {
    config: Arc<ServiceConfig>,
    extractor: Arc<dyn InfoExtractor>,
    observer: Arc<dyn ProgressObserver>,
}

impl Downloader {
    pub fn new(config: Arc<ServiceConfig>, extractor: Arc<dyn InfoExtractor>) -> Self {
        Self {
            config,
            extractor,
            observer: Arc::new(NoopProgress),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub async fn execute(&self, request: &MediaRequest) -> Result<DownloadResult, DownloadError> {
        self.execute_with_cancel(request, CancellationToken::new()).await
    }

    /// Run one job to a terminal phase. Cancelling `cancel` stops the tool
    /// and removes partial output exactly like a timeout does.
    pub async fn execute_with_cancel(
        &self,
        request: &MediaRequest,
        cancel: CancellationToken,
    ) -> Result<DownloadResult, DownloadError> {
        let job_id = Uuid::new_v4();
        info!(
            %job_id,
            url = %request.url,
            platform = %request.platform,
            format = %request.format,
            quality = %request.quality,
            "download requested"
        );

        debug!(%job_id, extractor = self.extractor.name(), "fetching metadata");
        let info = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(%job_id, "download cancelled before start");
                return Err(DownloadError::Cancelled);
            }
            info = self.extractor.extract(&request.url, request.platform) => info,
        };

        let mut job = DownloadJob::new(job_id, request.clone(), info, &self.config.downloads_dir);
        let result = self.run(&mut job, &cancel).await;

        match &result {
            Ok(done) => {
                job.advance(JobPhase::Succeeded);
                info!(
                    %job_id,
                    filename = %done.filename,
                    size = %format_file_size(done.size_bytes),
                    elapsed_ms = job.started_at.elapsed().as_millis() as u64,
                    "download finished"
                );
            }
            Err(e) => {
                job.advance(JobPhase::Failed);
                warn!(
                    %job_id,
                    kind = %e.kind(),
                    error = %e,
                    elapsed_ms = job.started_at.elapsed().as_millis() as u64,
                    "download failed"
                );
            }
        }
        result
    }

    fn build_args(&self, job: &DownloadJob) -> Vec<String> {
        let config = &self.config;
        let mut args = vec![
            "--format".to_string(),
            job.policy.selector.to_string(),
            "--output".to_string(),
            job.output_template.to_string_lossy().to_string(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--no-part".to_string(),
            "--max-filesize".to_string(),
            config.max_filesize.clone(),
            "--socket-timeout".to_string(),
            config.socket_timeout.as_secs().max(1).to_string(),
            "--retries".to_string(),
            config.retries.to_string(),
            "--fragment-retries".to_string(),
            config.fragment_retries.to_string(),
            "--no-warnings".to_string(),
            "--no-check-certificates".to_string(),
            "--prefer-ffmpeg".to_string(),
        ];

        if let Some(ffmpeg) = &config.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().to_string());
        }

        if job.policy.extracts_audio() {
            args.push("--extract-audio".to_string());
            args.push("--audio-format".to_string());
            args.push(AUDIO_EXTENSION.to_string());
            args.push("--audio-quality".to_string());
            args.push("0".to_string());
        }

        args.extend(profile_args(job.request.platform));
        args.push(job.request.url.clone());
        args
    }

    async fn run(&self, job: &mut DownloadJob, cancel: &CancellationToken) -> Result<DownloadResult, DownloadError> {
        let args = self.build_args(job);
        debug!(
            job_id = %job.job_id,
            tool = %self.config.tool.name(),
            args = %args[..args.len() - 1].join(" "),
            "spawning media tool"
        );

        let mut child = self
            .config
            .tool
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DownloadError::ToolNotFound {
                tool: self.config.tool.name(),
                source,
            })?;
        job.advance(JobPhase::Spawned);

        // Declared after `child` so it drops first, while the group id is still valid.
        let mut guard = JobGuard::new(job, &child, &self.config.downloads_dir);
        let outcome = self.supervise(job, &mut child, &mut guard, cancel).await;
        guard.disarm();
        outcome
    }

    async fn supervise(
        &self,
        job: &mut DownloadJob,
        child: &mut Child,
        guard: &mut JobGuard,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult, DownloadError> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::io("capture stdout", io::Error::other("stdout not piped")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::io("capture stderr", io::Error::other("stderr not piped")))?;

        let stderr_task = tokio::spawn(collect_stderr_tail(stderr, job.job_id));
        let mut lines = BufReader::new(stdout).split(b'\n');
        let mut state = StdoutState::default();
        let mut stdout_open = true;

        job.advance(JobPhase::RunningIdle);
        let deadline = tokio::time::sleep(self.config.idle_timeout);
        tokio::pin!(deadline);

        let stop = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Stop::Cancelled,
                _ = &mut deadline => {
                    break if job.phase == JobPhase::RunningActive {
                        Stop::ActiveTimeout
                    } else {
                        Stop::IdleTimeout
                    };
                }
                segment = lines.next_segment(), if stdout_open => match segment {
                    Ok(Some(bytes)) => {
                        let line = String::from_utf8_lossy(&bytes);
                        let started = state.observe(line.trim_end(), job.job_id, self.observer.as_ref());
                        if started && job.phase == JobPhase::RunningIdle {
                            job.advance(JobPhase::RunningActive);
                            // The active window replaces the idle one.
                            deadline
                                .as_mut()
                                .reset(tokio::time::Instant::now() + self.config.active_timeout);
                        }
                    }
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        debug!(job_id = %job.job_id, error = %e, "stdout read failed");
                        stdout_open = false;
                    }
                },
                status = child.wait() => match status {
                    Ok(status) => break Stop::Exited(status),
                    Err(e) => break Stop::WaitFailed(e),
                },
            }
        };

        let status = match stop {
            Stop::Exited(status) => {
                guard.child_reaped();
                status
            }
            Stop::IdleTimeout => {
                let error = DownloadError::NoResponse {
                    after: self.config.idle_timeout,
                };
                return Err(self.abandon(job, child, stderr_task, error).await);
            }
            Stop::ActiveTimeout => {
                let error = DownloadError::TooSlow {
                    after: self.config.active_timeout,
                };
                return Err(self.abandon(job, child, stderr_task, error).await);
            }
            Stop::Cancelled => {
                return Err(self.abandon(job, child, stderr_task, DownloadError::Cancelled).await);
            }
            Stop::WaitFailed(e) => {
                let error = DownloadError::io("wait for the media tool", e);
                return Err(self.abandon(job, child, stderr_task, error).await);
            }
        };

        let grace = self.config.termination_grace;

        // Lines still buffered after exit may carry the size-limit notice.
        if stdout_open {
            let drain = async {
                while let Ok(Some(bytes)) = lines.next_segment().await {
                    let line = String::from_utf8_lossy(&bytes);
                    state.observe(line.trim_end(), job.job_id, self.observer.as_ref());
                }
            };
            if timeout(grace, drain).await.is_err() {
                debug!(job_id = %job.job_id, "stdout still open after exit");
            }
        }

        let stderr_abort = stderr_task.abort_handle();
        let stderr = match timeout(grace, stderr_task).await {
            Ok(Ok(tail)) => tail,
            _ => {
                stderr_abort.abort();
                String::new()
            }
        };

        if !status.success() {
            debug!(job_id = %job.job_id, exit_code = ?status.code(), "media tool exited with an error");
            self.remove_job_files(job).await;
            return Err(failure_from_exit(status.code(), &stderr, &self.config.max_filesize));
        }

        job.advance(JobPhase::Verifying);
        self.verify(job, &state).await
    }

    /// Stop the child, drop its output and return `error` for the caller.
    async fn abandon(
        &self,
        job: &DownloadJob,
        child: &mut Child,
        stderr_task: tokio::task::JoinHandle<String>,
        error: DownloadError,
    ) -> DownloadError {
        info!(job_id = %job.job_id, reason = %error.kind(), "stopping media tool");
        terminate(child, self.config.termination_grace).await;
        stderr_task.abort();
        self.remove_job_files(job).await;
        error
    }

    async fn verify(&self, job: &DownloadJob, state: &StdoutState) -> Result<DownloadResult, DownloadError> {
        let path = match self.reconcile_artifact(job, state.reported_file.as_deref()).await {
            Some(path) => path,
            None if state.size_limit_hit => {
                return Err(DownloadError::TooLarge {
                    limit: self.config.max_filesize.clone(),
                })
            }
            None => return Err(DownloadError::ArtifactMissing),
        };

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(DownloadError::ArtifactMissing),
            Err(e) => {
                remove_quietly(&path).await;
                return Err(DownloadError::io("inspect the downloaded file", e));
            }
        };

        if size == 0 {
            remove_quietly(&path).await;
            return Err(DownloadError::ArtifactEmpty);
        }
        if size < self.config.min_artifact_bytes {
            remove_quietly(&path).await;
            return Err(DownloadError::ArtifactTooSmall { size });
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or(DownloadError::ArtifactMissing)?;

        Ok(DownloadResult {
            success: true,
            download_url: self.config.download_url(&filename),
            title: job.info.title.clone(),
            filename,
            size_bytes: size,
            format: job.request.format,
            quality: job.request.quality,
            platform: job.request.platform,
        })
    }

    /// Find the file the job actually produced. The selector may end up with
    /// a different container than predicted, so the directory is searched for
    /// the job token. Any other file carrying the token is removed.
    async fn reconcile_artifact(&self, job: &DownloadJob, reported: Option<&str>) -> Option<PathBuf> {
        let mut found = find_job_files(&self.config.downloads_dir, &job.token).await;
        if found.is_empty() {
            return None;
        }

        let chosen = found
            .iter()
            .position(|p| *p == job.output_path)
            .or_else(|| {
                reported.and_then(|name| {
                    found
                        .iter()
                        .position(|p| p.file_name().map_or(false, |n| n == name))
                })
            })
            .unwrap_or(0);
        let artifact = found.swap_remove(chosen);

        for stray in found {
            debug!(job_id = %job.job_id, path = %stray.display(), "removing stray job file");
            remove_quietly(&stray).await;
        }
        if artifact != job.output_path {
            debug!(
                job_id = %job.job_id,
                expected = %job.output_path.display(),
                actual = %artifact.display(),
                "artifact extension differs from prediction"
            );
        }
        Some(artifact)
    }

    /// Best-effort removal of everything the job wrote.
    async fn remove_job_files(&self, job: &DownloadJob) {
        for path in find_job_files(&self.config.downloads_dir, &job.token).await {
            debug!(job_id = %job.job_id, path = %path.display(), "removing partial output");
            remove_quietly(&path).await;
        }
    }
}

async fn find_job_files(dir: &Path, token: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "could not list downloads directory");
            return found;
        }
    };
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                if entry.file_name().to_string_lossy().contains(token) {
                    found.push(entry.path());
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "downloads directory entry unreadable");
                break;
            }
        }
    }
    found.sort();
    found
}

/// Blocking counterpart of `remove_job_files`, usable from `Drop`.
fn remove_job_files_now(dir: &Path, token: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().contains(token) {
            continue;
        }
        if let Err(e) = std::fs::remove_file(entry.path()) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(error = %e, "could not remove abandoned job file");
            }
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "could not remove file");
        }
    }
}

async fn collect_stderr_tail(stderr: ChildStderr, job_id: Uuid) -> String {
    let mut lines = BufReader::new(stderr).split(b'\n');
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(bytes)) = lines.next_segment().await {
        let line = String::from_utf8_lossy(&bytes).trim_end().to_string();
        if line.is_empty() {
            continue;
        }
        debug!(%job_id, "yt-dlp: {}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}
