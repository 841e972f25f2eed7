//! Removal of download job directories

use std::path::Path;
use tracing::{debug, info, warn};

/// Remove a job directory and everything below it
///
/// Best effort: failures are logged and swallowed. Returns whether the
/// directory was removed, which is `false` for a directory that did not
/// exist.
pub async fn cleanup(download_dir: &Path) -> bool {
    match tokio::fs::remove_dir_all(download_dir).await {
        Ok(()) => {
            info!(?download_dir, "removed download directory");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(?download_dir, "download directory already gone");
            false
        }
        Err(e) => {
            warn!(?download_dir, error = %e, "failed to remove download directory");
            false
        }
    }
}
