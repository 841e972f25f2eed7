//! Core types for xbox-savegame-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Marker substituted for `.` in remote blob names
const DOT_MARKER: char = 'X';
/// Marker substituted for `_` in remote blob names
const UNDERSCORE_MARKER: char = 'E';

/// Kind of a title-storage blob, taken from the suffix of its remote name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobKind {
    /// Suffix missing or not recognised
    Unknown,
    /// `,savedgame` - a connected-storage container (metadata document)
    SavedGame,
    /// `,binary` - raw bytes referenced from a container
    Binary,
    /// `,json`
    Json,
    /// `,config`
    Config,
}

impl BlobKind {
    /// Suffix used for this kind in remote names
    pub fn suffix(&self) -> &'static str {
        match self {
            BlobKind::Unknown => "",
            BlobKind::SavedGame => "savedgame",
            BlobKind::Binary => "binary",
            BlobKind::Json => "json",
            BlobKind::Config => "config",
        }
    }

    fn from_suffix(suffix: &str) -> Self {
        match suffix {
            "savedgame" => BlobKind::SavedGame,
            "binary" => BlobKind::Binary,
            "json" => BlobKind::Json,
            "config" => BlobKind::Config,
            _ => BlobKind::Unknown,
        }
    }
}

/// One remote file handle as returned by the listing endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobHandle {
    /// Remote name, e.g. `assemblies/0133f6681e6df707/objectsXass,savedgame`
    pub file_name: String,
    /// Optional human readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Entity tag
    pub etag: String,
    /// Timestamp reported by the writing client
    pub client_file_time: DateTime<Utc>,
    /// Size in bytes
    pub size: u64,
}

impl BlobHandle {
    /// Blob kind inferred from the `,<suffix>` of the remote name
    pub fn kind(&self) -> BlobKind {
        match self.file_name.rsplit_once(',') {
            Some((_, suffix)) => BlobKind::from_suffix(suffix),
            None => BlobKind::Unknown,
        }
    }

    /// Local relative path for the blob
    ///
    /// Strips a leading `/` and the type suffix, then decodes the `.` and `_`
    /// markers: `assemblies/01/objectsXass,savedgame` becomes `assemblies/01/objects.ass`.
    pub fn normalized_path(&self) -> PathBuf {
        normalize_remote_name(&self.file_name)
    }
}

/// Decode a remote blob name into a relative path
///
/// Empty, `.` and `..` segments are dropped, so the result never leaves
/// the directory it is joined onto.
pub fn normalize_remote_name(remote_name: &str) -> PathBuf {
    let trimmed = remote_name.trim_start_matches('/');
    let path = match trimmed.rsplit_once(',') {
        Some((path, _)) => path,
        None => trimmed,
    };

    let decoded: String = path
        .chars()
        .map(|c| match c {
            DOT_MARKER => '.',
            UNDERSCORE_MARKER => '_',
            other => other,
        })
        .collect();

    decoded
        .split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .collect()
}

/// Encode a relative path into a remote blob name of the given kind
///
/// Inverse of [`normalize_remote_name`] for paths that contain no literal
/// marker characters.
pub fn encode_remote_name(path: &str, kind: BlobKind) -> String {
    let encoded: String = path
        .chars()
        .map(|c| match c {
            '.' => DOT_MARKER,
            '_' => UNDERSCORE_MARKER,
            other => other,
        })
        .collect();

    match kind {
        BlobKind::Unknown => encoded,
        kind => format!("{},{}", encoded, kind.suffix()),
    }
}

/// Paging information of one listing page
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingInfo {
    /// Total number of blobs the service reports
    pub total_items: u64,
    /// Token for the next page, `None` when the listing is complete
    #[serde(default)]
    pub continuation_token: Option<String>,
}

/// The full set of blob handles for one service config id
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobCatalog {
    /// Blob handles in service order
    pub blobs: Vec<BlobHandle>,
    /// Paging info of the last page fetched
    pub paging_info: PagingInfo,
}

impl BlobCatalog {
    /// Whether more pages remain to be fetched
    pub fn has_more(&self) -> bool {
        self.paging_info.continuation_token.is_some()
    }

    /// Number of blobs collected so far
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the catalog holds no blobs
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

/// Result of a successful save download
#[derive(Clone, Debug)]
pub struct SaveDownload {
    /// Working directory of the job
    pub download_dir: PathBuf,
    /// The produced ZIP archive
    pub archive_path: PathBuf,
    /// Downloaded metadata blobs
    pub metadata_files: Vec<PathBuf>,
    /// Downloaded binary blobs
    pub binary_files: Vec<PathBuf>,
    /// Raw catalog dump
    pub catalog_file: PathBuf,
}

/// Pipeline events
///
/// Consumers subscribe via [`SaveManager::subscribe`](crate::SaveManager::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Credentials were refreshed and persisted
    Authenticated {
        /// The user id
        user_id: String,
        /// Xbox gamertag, if the XSTS token carries one
        gamertag: Option<String>,
    },

    /// Credentials were deleted after a failed refresh
    CredentialsEvicted {
        /// The user id
        user_id: String,
    },

    /// The blob catalog was listed
    CatalogListed {
        /// Service config id
        scid: String,
        /// Number of blobs
        blobs: usize,
    },

    /// All metadata blobs were downloaded
    MetadataFetched {
        /// Number of files written
        count: usize,
    },

    /// A metadata blob produced no binaries to download
    SelectionSkipped {
        /// Remote name of the metadata blob
        blob: String,
        /// Why it was skipped
        reason: String,
    },

    /// All binary blobs were downloaded
    BinariesFetched {
        /// Number of files written
        count: usize,
    },

    /// The archive was written
    Archived {
        /// Archive path
        path: PathBuf,
        /// Archive size in bytes
        size_bytes: u64,
    },

    /// A job directory was removed
    CleanedUp {
        /// The removed directory
        path: PathBuf,
    },
}
