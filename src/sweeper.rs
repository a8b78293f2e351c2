// Retention sweeper
//
// Deletes artifacts older than the retention window. Runs once at startup
// and then on a fixed interval. Listing, stat and delete are not atomic, so
// an entry that disappears in between is simply skipped.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("failed to list downloads directory")]
    ListDir(#[source] io::Error),
}

#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    dir: PathBuf,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(dir: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    /// Delete every entry whose modification time is older than the retention
    /// window. Returns how many entries were removed.
    ///
    /// A missing directory counts as empty. Per-entry failures are logged and
    /// skipped; only failing to list the directory is an error.
    pub async fn sweep(&self) -> Result<usize, SweepError> {
        let paths = match self.list().await {
            Ok(paths) => paths,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(SweepError::ListDir(e)),
        };
        Ok(self.sweep_paths(paths, SystemTime::now()).await)
    }

    async fn list(&self) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => paths.push(entry.path()),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to read downloads directory entry");
                    break;
                }
            }
        }
        Ok(paths)
    }

    async fn sweep_paths(&self, paths: Vec<PathBuf>, now: SystemTime) -> usize {
        let mut deleted = 0;
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            match self.remove_if_expired(&path, now).await {
                Ok(true) => {
                    deleted += 1;
                    info!(file = %name, "deleted expired file");
                }
                Ok(false) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %name, "entry vanished during sweep");
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "failed to sweep entry");
                }
            }
        }

        if deleted > 0 {
            info!(deleted, "cleanup completed");
        }
        deleted
    }

    async fn remove_if_expired(&self, path: &Path, now: SystemTime) -> io::Result<bool> {
        let meta = tokio::fs::symlink_metadata(path).await?;
        let modified = meta.modified()?;
        // A timestamp in the future yields an error here and is kept.
        let expired = now
            .duration_since(modified)
            .map(|age| age > self.retention)
            .unwrap_or(false);
        if !expired {
            return Ok(false);
        }

        if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }
        Ok(true)
    }

    /// Sweep now, then every `interval` until `cancel` fires.
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                retention_secs = self.retention.as_secs(),
                interval_secs = interval.as_secs(),
                "retention sweeper started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    // The first tick completes immediately.
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            warn!(error = %e, "cleanup failed");
                        }
                    }
                }
            }
            debug!("retention sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    const RETENTION: Duration = Duration::from_secs(2 * 60 * 60);

    fn file_aged(dir: &Path, name: &str, age: Duration) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[tokio::test]
    async fn deletes_only_entries_past_retention() {
        let dir = tempfile::tempdir().unwrap();
        let minute = Duration::from_secs(60);
        let fresh = file_aged(dir.path(), "fresh.mp4", RETENTION - minute);
        let stale = file_aged(dir.path(), "stale.mp4", RETENTION + minute);

        let sweeper = RetentionSweeper::new(dir.path(), RETENTION);
        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        assert!(fresh.exists());
        assert!(!stale.exists());

        assert_eq!(sweeper.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn vanished_entry_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = file_aged(dir.path(), "gone.mp4", RETENTION * 2);
        std::fs::remove_file(&path).unwrap();

        let sweeper = RetentionSweeper::new(dir.path(), RETENTION);
        let err = sweeper.remove_if_expired(&path, SystemTime::now()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn failing_entries_do_not_stop_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let vanished = dir.path().join("vanished.mp4");
        // Stat fails with ENOTDIR, which is neither benign nor fatal.
        let blocker = file_aged(dir.path(), "blocker", Duration::ZERO);
        let broken = blocker.join("inner.mp4");
        let stale = file_aged(dir.path(), "stale.mp4", RETENTION + Duration::from_secs(60));

        let sweeper = RetentionSweeper::new(dir.path(), RETENTION);
        let deleted = sweeper
            .sweep_paths(vec![vanished, broken, stale.clone()], SystemTime::now())
            .await;
        assert_eq!(deleted, 1);
        assert!(!stale.exists());
        assert!(blocker.exists());
    }

    #[tokio::test]
    async fn expired_directories_are_removed_with_their_contents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("leftover");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("part.mp4"), b"x").unwrap();
        let old = SystemTime::now() - RETENTION * 2;
        File::open(&nested).unwrap().set_modified(old).unwrap();

        let sweeper = RetentionSweeper::new(dir.path(), RETENTION);
        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        assert!(!nested.exists());
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sweeper = RetentionSweeper::new(dir.path().join("gone"), RETENTION);
        assert_eq!(sweeper.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn spawned_sweeper_runs_immediately_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let stale = file_aged(dir.path(), "stale.m4a", RETENTION * 2);

        let cancel = CancellationToken::new();
        let handle = RetentionSweeper::new(dir.path(), RETENTION).spawn(Duration::from_secs(3600), cancel.clone());

        for _ in 0..50 {
            if !stale.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!stale.exists());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
