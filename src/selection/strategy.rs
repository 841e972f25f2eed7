//! Save layout strategies

use super::{FileSelection, LookupMatch, PlannedFetch};
use crate::error::SelectionError;
use crate::types::BlobHandle;
use std::path::Path;
use tracing::{debug, warn};

/// Turns the lookup matches of one metadata blob into download targets
pub trait LayoutStrategy: Send + Sync {
    /// Plan the binary downloads for `blob`
    ///
    /// `matches` is never empty; `download_dir` is the job directory.
    fn plan(
        &self,
        blob: &BlobHandle,
        matches: Vec<LookupMatch>,
        download_dir: &Path,
    ) -> Result<FileSelection, SelectionError>;
}

/// Each match key becomes a file inside the blob's normalized directory
///
/// `assemblies/01/objectsXass,savedgame` with atoms `{"ECW0": ..., "_DIR": ...}`
/// yields `<job>/assemblies/01/objects.ass/ECW0` and `.../_DIR`.
pub struct ByLookupKeyStrategy;

impl LayoutStrategy for ByLookupKeyStrategy {
    fn plan(
        &self,
        blob: &BlobHandle,
        matches: Vec<LookupMatch>,
        download_dir: &Path,
    ) -> Result<FileSelection, SelectionError> {
        let base = download_dir.join(blob.normalized_path());
        let mut planned = Vec::with_capacity(matches.len());

        for m in matches {
            let Some(remote_name) = m.value.as_str() else {
                warn!(blob = %blob.file_name, key = %m.key, "lookup match is not a blob name, skipping");
                continue;
            };
            if !is_plain_file_name(&m.key) {
                warn!(blob = %blob.file_name, key = %m.key, "lookup key is not a usable file name, skipping");
                continue;
            }

            let local_path = base.join(&m.key);
            debug!(remote = %remote_name, ?local_path, "queued binary");
            planned.push(PlannedFetch {
                remote_name: remote_name.to_string(),
                local_path,
            });
        }

        Ok(planned)
    }
}

/// Exactly one match, written to the blob's own normalized path
pub struct ByRemoteNameStrategy;

impl LayoutStrategy for ByRemoteNameStrategy {
    fn plan(
        &self,
        blob: &BlobHandle,
        matches: Vec<LookupMatch>,
        download_dir: &Path,
    ) -> Result<FileSelection, SelectionError> {
        let [single] = <[LookupMatch; 1]>::try_from(matches).map_err(|matches| {
            SelectionError::Cardinality {
                blob: blob.file_name.clone(),
                expected: 1,
                found: matches.len(),
            }
        })?;

        let Some(remote_name) = single.value.as_str() else {
            return Err(SelectionError::NotABlobName {
                blob: blob.file_name.clone(),
                key: single.key,
            });
        };

        let local_path = download_dir.join(blob.normalized_path());
        debug!(remote = %remote_name, ?local_path, "queued binary");
        Ok(vec![PlannedFetch {
            remote_name: remote_name.to_string(),
            local_path,
        }])
    }
}

fn is_plain_file_name(key: &str) -> bool {
    !key.is_empty() && key != "." && key != ".." && !key.contains(['/', '\\'])
}
