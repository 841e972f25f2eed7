//! One save download: list, fetch metadata, select, fetch binaries, archive

use crate::archive::archive_files;
use crate::auth::{AuthSession, XboxCredential};
use crate::cleanup::cleanup;
use crate::config::{Config, TransferConfig};
use crate::error::{Error, Result};
use crate::selection::{PlannedFetch, TitleSelector};
use crate::titlestorage::TitleStorageClient;
use crate::types::{BlobCatalog, BlobHandle, Event, SaveDownload};
use crate::utils::{archive_file_name, request_id, sanitize_file_name};
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const MAX_JOB_ATTEMPTS: u32 = 100;

/// Working directory layout of one invocation
///
/// ```text
/// <download_root>/<request_id>/
///     _meta/blobs_list.json
///     _meta/<normalized blob path>.meta.json
///     <binaries, placed by the save layout>
///     <pfn>_Saves_<display name>_<request_id>.zip
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadJob {
    /// User the job runs for
    pub user_id: String,
    /// `{user_id}_{unix millis}`
    pub request_id: String,
    /// `<download_root>/<request_id>`
    pub download_dir: PathBuf,
    /// Holds the catalog dump and the metadata blobs
    pub metadata_dir: PathBuf,
    /// Output archive
    pub archive_path: PathBuf,
}

impl DownloadJob {
    /// Lay out a job started at `at`
    pub fn new(
        download_root: &Path,
        user_id: &str,
        pfn: &str,
        display_name: &str,
        transfer: &TransferConfig,
        at: DateTime<Utc>,
    ) -> Self {
        Self::with_request_id(
            download_root,
            user_id,
            pfn,
            display_name,
            transfer,
            request_id(user_id, at),
        )
    }

    fn with_request_id(
        download_root: &Path,
        user_id: &str,
        pfn: &str,
        display_name: &str,
        transfer: &TransferConfig,
        request_id: String,
    ) -> Self {
        let download_dir = download_root.join(&request_id);
        Self {
            user_id: user_id.to_string(),
            metadata_dir: download_dir.join(&transfer.metadata_dir_name),
            archive_path: download_dir.join(archive_file_name(pfn, display_name, &request_id)),
            request_id,
            download_dir,
        }
    }

    /// Lay out and create a job started at `at` in a directory nobody else uses
    ///
    /// When the request id is already taken on disk, `_1`, `_2`, ... is
    /// appended until a free one is found.
    pub async fn create_fresh(
        download_root: &Path,
        user_id: &str,
        pfn: &str,
        display_name: &str,
        transfer: &TransferConfig,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        let base = request_id(user_id, at);
        for attempt in 0..MAX_JOB_ATTEMPTS {
            let id = match attempt {
                0 => base.clone(),
                n => format!("{}_{}", base, n),
            };
            let job =
                Self::with_request_id(download_root, user_id, pfn, display_name, transfer, id);
            match job.create().await {
                Ok(()) => return Ok(job),
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(request_id = %job.request_id, "job directory taken, trying next id");
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::Other(format!("no free job directory for {}", base)))
    }

    /// Create the job directories
    ///
    /// Fails if the job directory already exists; jobs are never reused.
    pub async fn create(&self) -> Result<()> {
        if let Some(root) = self.download_dir.parent() {
            tokio::fs::create_dir_all(root).await?;
        }
        tokio::fs::create_dir(&self.download_dir).await?;
        tokio::fs::create_dir_all(&self.metadata_dir).await?;
        Ok(())
    }

    /// Where the downloaded metadata of `blob` is stored
    pub fn metadata_path(&self, blob: &BlobHandle, suffix: &str) -> PathBuf {
        let normalized = blob.normalized_path();
        let name = match normalized.file_name() {
            Some(name) => format!("{}{}", name.to_string_lossy(), suffix),
            None => format!("_{}", suffix),
        };
        match normalized.parent() {
            Some(parent) => self.metadata_dir.join(parent).join(name),
            None => self.metadata_dir.join(name),
        }
    }

    /// Distinct metadata targets for `blobs`, in catalog order
    ///
    /// Blobs whose names normalize to a path already taken get their remote
    /// kind inserted before the suffix (`slot.dat.json.meta.json`), plus a
    /// counter while that is taken too.
    pub fn metadata_paths(&self, blobs: &[BlobHandle], suffix: &str) -> Vec<PathBuf> {
        let mut taken = HashSet::new();
        blobs
            .iter()
            .map(|blob| {
                let plain = self.metadata_path(blob, suffix);
                if taken.insert(plain.clone()) {
                    return plain;
                }

                let kind = match blob.file_name.rsplit_once(',') {
                    Some((_, kind)) => sanitize_file_name(kind),
                    None => "blob".to_string(),
                };
                let mut n = 1u32;
                loop {
                    let qualifier = match n {
                        1 => kind.clone(),
                        n => format!("{}.{}", kind, n),
                    };
                    let candidate = self.metadata_path(blob, &format!(".{}{}", qualifier, suffix));
                    if taken.insert(candidate.clone()) {
                        warn!(blob = %blob.file_name, path = ?candidate, "metadata path collides, qualifying by kind");
                        return candidate;
                    }
                    n += 1;
                }
            })
            .collect()
    }
}

/// A user's authenticated view on one title's storage
pub struct TitleStorageContext {
    pub(super) user_id: String,
    pub(super) auth: AuthSession,
    pub(super) scid: String,
    pub(super) pfn: String,
    pub(super) selector: TitleSelector,
    pub(super) storage: TitleStorageClient,
    pub(super) config: Arc<Config>,
    pub(super) event_tx: broadcast::Sender<Event>,
}

impl TitleStorageContext {
    /// The credential requests are authorized with
    pub fn credential(&self) -> &XboxCredential {
        &self.auth.credential
    }

    /// Service config id
    pub fn scid(&self) -> &str {
        &self.scid
    }

    /// Package family name
    pub fn pfn(&self) -> &str {
        &self.pfn
    }

    /// Selector deciding which binaries are fetched
    pub fn selector(&self) -> &TitleSelector {
        &self.selector
    }

    /// List the title's blob catalog
    pub async fn list_blobs(&self) -> Result<BlobCatalog> {
        self.storage
            .list_blobs(&self.auth.session, &self.auth.credential, &self.scid, &self.pfn)
            .await
    }

    async fn fetch(&self, remote_name: &str, target: PathBuf) -> Result<PathBuf> {
        self.storage
            .fetch_blob(
                &self.auth.session,
                &self.auth.credential,
                &self.scid,
                &self.pfn,
                remote_name,
                &target,
            )
            .await
    }

    /// Download every save file of the title into a fresh job directory and archive it
    ///
    /// All-or-nothing: a failed listing, a failed fetch in either batch or a
    /// fatal selection error aborts the run and removes the job directory.
    /// Metadata blobs that are not JSON or match nothing are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::NothingToFetch`] when the catalog is empty.
    pub async fn download_save_files(&self) -> Result<SaveDownload> {
        let job = DownloadJob::create_fresh(
            self.config.download_dir(),
            &self.user_id,
            &self.pfn,
            &self.auth.credential.display_name(),
            &self.config.transfer,
            Utc::now(),
        )
        .await?;
        info!(request_id = %job.request_id, scid = %self.scid, pfn = %self.pfn, "starting save download");

        match self.run(&job).await {
            Ok(download) => Ok(download),
            Err(e) => {
                warn!(request_id = %job.request_id, error = %e, "save download failed");
                cleanup(&job.download_dir).await;
                Err(e)
            }
        }
    }

    async fn run(&self, job: &DownloadJob) -> Result<SaveDownload> {
        let transfer = &self.config.transfer;
        let width = transfer.max_concurrent_fetches.max(1);

        // 1. catalog
        let catalog = self.list_blobs().await?;
        let catalog_file = job.metadata_dir.join(&transfer.catalog_file_name);
        tokio::fs::write(&catalog_file, serde_json::to_vec_pretty(&catalog)?).await?;

        self.event_tx
            .send(Event::CatalogListed {
                scid: self.scid.clone(),
                blobs: catalog.len(),
            })
            .ok();
        if catalog.is_empty() {
            return Err(Error::NothingToFetch {
                scid: self.scid.clone(),
            });
        }

        // 2. metadata blobs
        let targets = job.metadata_paths(&catalog.blobs, &transfer.metadata_suffix);
        let metadata_files: Vec<PathBuf> = stream::iter(catalog.blobs.iter().zip(targets))
            .map(|(blob, target)| self.fetch(&blob.file_name, target))
            .buffered(width)
            .try_collect()
            .await?;

        info!(count = metadata_files.len(), "downloaded metadata blobs");
        self.event_tx
            .send(Event::MetadataFetched {
                count: metadata_files.len(),
            })
            .ok();
        if metadata_files.is_empty() {
            return Err(Error::NothingToFetch {
                scid: self.scid.clone(),
            });
        }

        // 3. selection
        let planned = self
            .plan_binaries(&catalog.blobs, &metadata_files, &job.download_dir)
            .await?;

        // 4. binaries
        let binary_files: Vec<PathBuf> = stream::iter(planned.iter())
            .map(|fetch| self.fetch(&fetch.remote_name, fetch.local_path.clone()))
            .buffered(width)
            .try_collect()
            .await?;

        info!(count = binary_files.len(), "downloaded binary blobs");
        self.event_tx
            .send(Event::BinariesFetched {
                count: binary_files.len(),
            })
            .ok();

        // 5. archive
        let files: Vec<PathBuf> = std::iter::once(catalog_file.clone())
            .chain(metadata_files.iter().cloned())
            .chain(binary_files.iter().cloned())
            .collect();
        let archive_path =
            archive_files(files, job.download_dir.clone(), job.archive_path.clone()).await?;

        let size_bytes = tokio::fs::metadata(&archive_path).await?.len();
        if size_bytes == 0 {
            return Err(Error::Other(format!(
                "archive {} is empty",
                archive_path.display()
            )));
        }
        self.event_tx
            .send(Event::Archived {
                path: archive_path.clone(),
                size_bytes,
            })
            .ok();

        info!(request_id = %job.request_id, ?archive_path, size_bytes, "save download complete");
        Ok(SaveDownload {
            download_dir: job.download_dir.clone(),
            archive_path,
            metadata_files,
            binary_files,
            catalog_file,
        })
    }

    async fn plan_binaries(
        &self,
        blobs: &[BlobHandle],
        metadata_files: &[PathBuf],
        download_dir: &Path,
    ) -> Result<Vec<PlannedFetch>> {
        let mut planned = Vec::new();
        let mut targets = HashSet::new();

        for (blob, path) in blobs.iter().zip(metadata_files) {
            let bytes = tokio::fs::read(path).await?;
            let selection = match self.selector.select_bytes(blob, path, &bytes, download_dir) {
                Ok(selection) => selection,
                Err(e) if e.is_skippable() => {
                    warn!(blob = %blob.file_name, ?path, error = %e, "no binaries selected, skipping");
                    self.event_tx
                        .send(Event::SelectionSkipped {
                            blob: blob.file_name.clone(),
                            reason: e.to_string(),
                        })
                        .ok();
                    continue;
                }
                Err(e) => return Err(Error::Selection(e)),
            };

            for fetch in selection {
                if targets.insert(fetch.local_path.clone()) {
                    planned.push(fetch);
                } else {
                    warn!(remote = %fetch.remote_name, local = ?fetch.local_path, "target already planned, skipping");
                }
            }
        }

        debug!(count = planned.len(), "planned binary downloads");
        Ok(planned)
    }
}
