//! Time-based retention sweep over the shared working directories.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Outcome of sweeping one or more directories.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.scanned += other.scanned;
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

/// Removes files in `dir` last modified more than `max_age` before `now`.
///
/// Per-file errors are logged and counted; they never stop the sweep.
/// Subdirectories are left alone.
pub async fn sweep_directory(dir: &Path, max_age: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Error reading directory {}: {}", dir.display(), e);
            report.failed += 1;
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Error listing directory {}: {}", dir.display(), e);
                report.failed += 1;
                break;
            }
        };

        let path = entry.path();
        report.scanned += 1;

        match expired(&path, max_age, now).await {
            Ok(false) => {}
            Ok(true) => match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!("Deleted file: {}", path.display());
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::error!("Error deleting file {}: {}", path.display(), e);
                    report.failed += 1;
                }
            },
            Err(e) => {
                tracing::error!("Error processing file {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    report
}

async fn expired(path: &Path, max_age: Duration, now: SystemTime) -> std::io::Result<bool> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Ok(false);
    }
    let modified = metadata.modified()?;
    // A file stamped in the future has age zero.
    let age = now.duration_since(modified).unwrap_or_default();
    Ok(age > max_age)
}

/// Sweeps every directory in turn.
pub async fn sweep_all(dirs: &[PathBuf], max_age: Duration, now: SystemTime) -> SweepReport {
    tracing::info!("Starting cleanup process...");
    let mut total = SweepReport::default();
    for dir in dirs {
        total.merge(sweep_directory(dir, max_age, now).await);
    }
    tracing::info!(
        "Cleanup process completed: {} scanned, {} removed, {} failed",
        total.scanned,
        total.removed,
        total.failed
    );
    total
}
