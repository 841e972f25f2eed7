//! ZIP packaging of a finished download job

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

/// Write every existing file of `files` into a deflated ZIP at `output`
///
/// Entry names are the paths relative to `root`, joined with `/`. Paths
/// that do not exist are skipped, as are duplicates and paths outside
/// `root`. `output` itself is never added.
pub fn archive(files: &[PathBuf], root: &Path, output: &Path) -> Result<PathBuf> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = ZipWriter::new(BufWriter::new(File::create(output)?));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut seen = HashSet::new();

    for path in files {
        if path == output {
            continue;
        }
        if !path.is_file() {
            debug!(?path, "not on disk, leaving out of archive");
            continue;
        }
        let Some(name) = entry_name(path, root) else {
            warn!(?path, ?root, "file outside the job directory, leaving out of archive");
            continue;
        };
        if !seen.insert(name.clone()) {
            continue;
        }

        writer.start_file(name.as_str(), options)?;
        let mut source = File::open(path)?;
        std::io::copy(&mut source, &mut writer)?;
        debug!(entry = %name, "archived file");
    }

    let mut inner = writer.finish()?;
    inner.flush()?;

    info!(?output, entries = seen.len(), "archive written");
    Ok(output.to_path_buf())
}

/// [`archive`] on the blocking thread pool
pub async fn archive_files(files: Vec<PathBuf>, root: PathBuf, output: PathBuf) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || archive(&files, &root, &output))
        .await
        .map_err(|e| Error::Other(format!("archive task failed: {}", e)))?
}

fn entry_name(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn write(root: &Path, relative: &str, contents: &[u8]) -> PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn entries(zip_path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn missing_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let files = vec![
            write(root, "_meta/blobs_list.json", b"{}"),
            root.join("never/downloaded"),
            write(root, "assemblies/01/objects.ass/ECW0", &[7u8; 2048]),
        ];
        let output = root.join("saves.zip");

        let produced = archive(&files, root, &output).unwrap();
        assert_eq!(produced, output);
        assert!(std::fs::metadata(&output).unwrap().len() > 0);
        assert_eq!(
            entries(&output),
            vec!["_meta/blobs_list.json", "assemblies/01/objects.ass/ECW0"]
        );
    }

    #[test]
    fn entries_are_deflated_and_intact() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let contents = vec![b'z'; 64 * 1024];
        let files = vec![write(root, "worlds/main.spark", &contents)];
        let output = root.join("saves.zip");

        archive(&files, root, &output).unwrap();

        let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut entry = zip.by_name("worlds/main.spark").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        assert!(entry.compressed_size() < entry.size());

        let mut read_back = Vec::new();
        std::io::copy(&mut entry, &mut read_back).unwrap();
        assert_eq!(read_back, contents);
    }

    #[test]
    fn duplicates_outsiders_and_output_are_left_out() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = dir.path().join("job");
        let kept = write(&root, "a.bin", b"a");
        let stray = write(outside.path(), "b.bin", b"b");
        let output = root.join("job.zip");
        std::fs::write(&output, b"old archive").unwrap();

        archive(&[kept.clone(), kept, stray, output.clone()], &root, &output).unwrap();
        assert_eq!(entries(&output), vec!["a.bin"]);
    }

    #[tokio::test]
    async fn archive_files_runs_off_the_runtime() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let files = vec![write(&root, "x/y.bin", b"xy")];

        let output = archive_files(files, root.clone(), root.join("out.zip"))
            .await
            .unwrap();
        assert_eq!(entries(&output), vec!["x/y.bin"]);
    }
}
