//! Save manager: the entry point tying authentication, listing, selection
//! and archival together.
//!
//! - [`download`] - one download job per invocation

mod download;


pub use download::{DownloadJob, TitleStorageContext};

use crate::auth::{AuthSession, AuthSessionProvider, IdentityProvider, XboxLiveIdentity};
use crate::cleanup::cleanup;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::registry::TitleRegistry;
use crate::titlestorage::TitleStorageClient;
use crate::types::{Event, SaveDownload};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Main save manager instance (cloneable, all shared state is Arc-wrapped)
#[derive(Clone)]
pub struct SaveManager {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Credential refresh and session creation
    pub(crate) auth: AuthSessionProvider,
    /// Known titles
    pub(crate) registry: Arc<TitleRegistry>,
    /// Title-storage client
    pub(crate) storage: TitleStorageClient,
}

impl SaveManager {
    /// Create a manager from configuration
    ///
    /// Validates the configuration, creates the download root and loads the
    /// credential store and title registry once. Tokens are refreshed
    /// against Xbox Live.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.download_dir()).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create download directory '{}': {}",
                    config.download_dir().display(),
                    e
                ),
            ))
        })?;

        let credentials = CredentialStore::load(&config.storage.tokens_file).await?;
        let registry = TitleRegistry::load(&config.storage.games_file).await?;
        let identity = Arc::new(XboxLiveIdentity::new(config.auth.clone()));

        Ok(Self::from_parts(config, credentials, registry, identity))
    }

    /// Create a manager from already loaded state
    pub fn from_parts(
        config: Config,
        credentials: CredentialStore,
        registry: TitleRegistry,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        let auth = AuthSessionProvider::new(credentials, identity, event_tx.clone());
        let storage = TitleStorageClient::new(config.transfer.titlestorage_url.clone());

        info!(
            titles = registry.len(),
            download_dir = ?config.download_dir(),
            "save manager initialized"
        );

        Self {
            event_tx,
            config: Arc::new(config),
            auth,
            registry: Arc::new(registry),
            storage,
        }
    }

    /// Subscribe to pipeline events
    ///
    /// Each subscriber receives all events independently. A subscriber that
    /// falls more than 1000 events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The title registry
    pub fn registry(&self) -> &TitleRegistry {
        &self.registry
    }

    /// Refresh a user's credentials and open a signed session
    ///
    /// See [`AuthSessionProvider::acquire`].
    pub async fn acquire(&self, user_id: &str) -> Result<AuthSession> {
        self.auth.acquire(user_id).await
    }

    /// Whether credentials are stored for a user
    pub async fn has_credentials(&self, user_id: &str) -> bool {
        self.auth.has_credentials(user_id).await
    }

    /// Prepare a download of one title's saves for a user
    ///
    /// Authenticates first; the selector comes from the registry entry of
    /// `pfn`, or the default one when the package is not registered.
    pub async fn titlestorage_context(
        &self,
        user_id: &str,
        scid: &str,
        pfn: &str,
    ) -> Result<TitleStorageContext> {
        let auth = self.acquire(user_id).await?;
        Ok(TitleStorageContext {
            user_id: user_id.to_string(),
            auth,
            scid: scid.to_string(),
            pfn: pfn.to_string(),
            selector: self.registry.selector_for(pfn),
            storage: self.storage.clone(),
            config: self.config.clone(),
            event_tx: self.event_tx.clone(),
        })
    }

    /// Like [`titlestorage_context`](Self::titlestorage_context), for a title by display name
    pub async fn context_for_title(&self, user_id: &str, name: &str) -> Result<TitleStorageContext> {
        let title = self.registry.get(name).ok_or_else(|| Error::UnknownTitle {
            name: name.to_string(),
        })?;
        let (scid, pfn) = (
            title.service_config_id.clone(),
            title.package_family_name.clone(),
        );
        self.titlestorage_context(user_id, &scid, &pfn).await
    }

    /// Download and archive the saves of a registered title
    pub async fn download_title(&self, user_id: &str, name: &str) -> Result<SaveDownload> {
        self.context_for_title(user_id, name)
            .await?
            .download_save_files()
            .await
    }

    /// Remove the working directory of a finished download
    ///
    /// Best effort; returns whether anything was removed.
    pub async fn cleanup(&self, download_dir: &Path) -> bool {
        let removed = cleanup(download_dir).await;
        if removed {
            self.event_tx
                .send(Event::CleanedUp {
                    path: download_dir.to_path_buf(),
                })
                .ok();
        }
        removed
    }
}
