//! Configuration types for xbox-savegame-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity provider settings (OAuth client and Xbox Live endpoints)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth client id of the registered Azure application
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret (None for public clients)
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Redirect URI registered for the client
    #[serde(default)]
    pub redirect_uri: String,

    /// OAuth scopes requested on refresh
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Token service endpoints
    #[serde(default)]
    pub endpoints: AuthEndpoints,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_uri: String::new(),
            scopes: default_scopes(),
            endpoints: AuthEndpoints::default(),
        }
    }
}

/// URLs of the token services taking part in a refresh
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthEndpoints {
    /// OAuth2 token endpoint
    #[serde(default = "default_oauth_token_url")]
    pub oauth_token_url: String,

    /// Xbox Live user authentication endpoint
    #[serde(default = "default_user_auth_url")]
    pub user_auth_url: String,

    /// Xbox Live device authentication endpoint
    #[serde(default = "default_device_auth_url")]
    pub device_auth_url: String,

    /// XSTS authorization endpoint
    #[serde(default = "default_xsts_auth_url")]
    pub xsts_auth_url: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            oauth_token_url: default_oauth_token_url(),
            user_auth_url: default_user_auth_url(),
            device_auth_url: default_device_auth_url(),
            xsts_auth_url: default_xsts_auth_url(),
        }
    }
}

/// Locations of persisted state and downloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Credential store (default: "user_tokens.json")
    #[serde(default = "default_tokens_file")]
    pub tokens_file: PathBuf,

    /// Title metadata registry (default: "games.json")
    #[serde(default = "default_games_file")]
    pub games_file: PathBuf,

    /// Root under which every download job gets its own directory (default: "downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tokens_file: default_tokens_file(),
            games_file: default_games_file(),
            download_dir: default_download_dir(),
        }
    }
}

/// Title-storage transfer settings and job directory layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Title-storage service base URL
    #[serde(default = "default_titlestorage_url")]
    pub titlestorage_url: String,

    /// Maximum blob downloads in flight per batch (default: 16)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Subdirectory of a job holding the catalog dump and metadata blobs (default: "_meta")
    #[serde(default = "default_metadata_dir_name")]
    pub metadata_dir_name: String,

    /// File name of the raw catalog dump (default: "blobs_list.json")
    #[serde(default = "default_catalog_file_name")]
    pub catalog_file_name: String,

    /// Suffix appended to every downloaded metadata blob (default: ".meta.json")
    #[serde(default = "default_metadata_suffix")]
    pub metadata_suffix: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            titlestorage_url: default_titlestorage_url(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            metadata_dir_name: default_metadata_dir_name(),
            catalog_file_name: default_catalog_file_name(),
            metadata_suffix: default_metadata_suffix(),
        }
    }
}

/// Main configuration for [`SaveManager`](crate::SaveManager)
///
/// Fields are organized into logical sub-configs:
/// - [`auth`](AuthConfig) - OAuth client and token endpoints
/// - [`storage`](StorageConfig) - credential store, registry, download root
/// - [`transfer`](TransferConfig) - title-storage URL, fan-out width, job layout
///
/// The sub-configs are flattened, so the serialized form has no nesting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// OAuth client and token endpoints
    #[serde(flatten)]
    pub auth: AuthConfig,

    /// Persisted state and download locations
    #[serde(flatten)]
    pub storage: StorageConfig,

    /// Title-storage transfer settings
    #[serde(flatten)]
    pub transfer: TransferConfig,
}

impl Config {
    /// Build a configuration from environment variables
    ///
    /// Reads `XBOX_CLIENT_ID` and `REDIRECT_URI` (required) plus the optional
    /// `XBOX_CLIENT_SECRET`, `TOKENS_FILE`, `GAMES_FILE` and `DOWNLOAD_DIR`.
    /// Loading a `.env` file beforehand is left to the caller.
    pub fn from_env() -> Result<Self> {
        let required = |key: &str| {
            std::env::var(key).map_err(|_| Error::Config {
                message: format!("missing environment variable {}", key),
                key: Some(key.to_string()),
            })
        };

        let mut config = Config::default();
        config.auth.client_id = required("XBOX_CLIENT_ID")?;
        config.auth.redirect_uri = required("REDIRECT_URI")?;
        config.auth.client_secret = std::env::var("XBOX_CLIENT_SECRET").ok();

        if let Ok(path) = std::env::var("TOKENS_FILE") {
            config.storage.tokens_file = path.into();
        }
        if let Ok(path) = std::env::var("GAMES_FILE") {
            config.storage.games_file = path.into();
        }
        if let Ok(path) = std::env::var("DOWNLOAD_DIR") {
            config.storage.download_dir = path.into();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.auth.client_id.trim().is_empty() {
            return Err(Error::Config {
                message: "client id must not be empty".into(),
                key: Some("client_id".into()),
            });
        }
        if self.auth.redirect_uri.trim().is_empty() {
            return Err(Error::Config {
                message: "redirect uri must not be empty".into(),
                key: Some("redirect_uri".into()),
            });
        }
        if self.transfer.max_concurrent_fetches == 0 {
            return Err(Error::Config {
                message: "max_concurrent_fetches must be at least 1".into(),
                key: Some("max_concurrent_fetches".into()),
            });
        }
        Ok(())
    }

    /// Root of all download jobs
    pub fn download_dir(&self) -> &PathBuf {
        &self.storage.download_dir
    }
}

fn default_scopes() -> Vec<String> {
    vec![
        "Xboxlive.signin".to_string(),
        "Xboxlive.offline_access".to_string(),
    ]
}

fn default_oauth_token_url() -> String {
    "https://login.live.com/oauth20_token.srf".to_string()
}

fn default_user_auth_url() -> String {
    "https://user.auth.xboxlive.com/user/authenticate".to_string()
}

fn default_device_auth_url() -> String {
    "https://device.auth.xboxlive.com/device/authenticate".to_string()
}

fn default_xsts_auth_url() -> String {
    "https://xsts.auth.xboxlive.com/xsts/authorize".to_string()
}

fn default_tokens_file() -> PathBuf {
    PathBuf::from("user_tokens.json")
}

fn default_games_file() -> PathBuf {
    PathBuf::from("games.json")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_titlestorage_url() -> String {
    "https://titlestorage.xboxlive.com".to_string()
}

fn default_max_concurrent_fetches() -> usize {
    16
}

fn default_metadata_dir_name() -> String {
    "_meta".to_string()
}

fn default_catalog_file_name() -> String {
    "blobs_list.json".to_string()
}

fn default_metadata_suffix() -> String {
    ".meta.json".to_string()
}
