//! Per-request cleanup of temporary files.

use std::path::PathBuf;

/// When a registered file should be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Always,
    OnFailure,
}

/// Files created on behalf of one request.
///
/// [`CleanupList::drain`] removes them at the end of the request. If the list
/// is dropped without being drained (for example because the request future
/// was cancelled) the remaining files are removed synchronously.
#[derive(Debug, Default)]
pub struct CleanupList {
    entries: Vec<(PathBuf, Removal)>,
}

impl CleanupList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file removed whatever the outcome.
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        self.entries.push((path.into(), Removal::Always));
    }

    /// Registers an output that is kept if the request succeeds.
    pub fn register_output(&mut self, path: impl Into<PathBuf>) {
        self.entries.push((path.into(), Removal::OnFailure));
    }

    /// Takes over every file registered with `other`.
    pub fn absorb(&mut self, mut other: CleanupList) {
        self.entries.append(&mut other.entries);
    }

    /// Removes registered files. Errors are logged, never returned.
    pub async fn drain(mut self, succeeded: bool) {
        for (path, removal) in std::mem::take(&mut self.entries) {
            if succeeded && removal == Removal::OnFailure {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("Removed temporary file: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for CleanupList {
    fn drop(&mut self) {
        for (path, _) in self.entries.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed abandoned file: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}
