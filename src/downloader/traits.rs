// Progress observer trait definition

use tracing::info;
use uuid::Uuid;

use super::models::DownloadProgress;

/// Receives progress updates from running download jobs.
///
/// Called from the job's supervision loop, so implementations must return
/// quickly and must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, job_id: Uuid, progress: &DownloadProgress);
}

/// Drops every update
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn on_progress(&self, _job_id: Uuid, _progress: &DownloadProgress) {}
}

/// Logs every update at info level
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, job_id: Uuid, progress: &DownloadProgress) {
        info!(%job_id, percent = progress.percent, "{}", progress.status);
    }
}
