//! # xbox-savegame-dl
//!
//! Library for retrieving cloud-synced Xbox save data from title storage
//! on behalf of an authenticated user, and packaging it as a ZIP archive.
//!
//! ## Design Philosophy
//!
//! xbox-savegame-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding (e.g. in a chat bot)
//! - **All-or-nothing** - Every invocation is a fresh fetch into its own job directory
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Configurable per title** - A registry maps each game to the blobs worth keeping
//!
//! ## Pipeline
//!
//! authenticate → list blobs → fetch metadata blobs (concurrently) →
//! select binaries → fetch binaries (concurrently) → archive → cleanup (optional)
//!
//! ## Quick Start
//!
//! ```no_run
//! use xbox_savegame_dl::{Config, SaveManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = SaveManager::new(Config::from_env()?).await?;
//!
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     match manager.download_title("cli_user", "Minecraft").await {
//!         Ok(download) => println!("saved to {}", download.archive_path.display()),
//!         Err(e) => eprintln!("{}", e.user_message()),
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// ZIP packaging
pub mod archive;
/// Authenticated, signed sessions
pub mod auth;
/// Job directory removal
pub mod cleanup;
/// Configuration types
pub mod config;
/// Credential bundles and their file store
pub mod credentials;
/// Error types
pub mod error;
/// Save manager and download jobs
pub mod manager;
/// Title metadata registry
pub mod registry;
/// Metadata to binary selection
pub mod selection;
/// Title-storage HTTP client
pub mod titlestorage;
/// Core types and events
pub mod types;
/// Naming helpers
pub mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use auth::{
    AuthSession, AuthSessionProvider, IdentityProvider, RequestSigner, SignedSession,
    XboxCredential, XboxLiveIdentity,
};
pub use config::{AuthConfig, AuthEndpoints, Config, StorageConfig, TransferConfig};
pub use credentials::{CredentialBundle, CredentialStore, OAuthToken, XboxToken};
pub use error::{AuthError, Error, Result, SelectionError};
pub use manager::{DownloadJob, SaveManager, TitleStorageContext};
pub use registry::{SaveLayout, TitleDescriptor, TitleRegistry};
pub use selection::{LookupExpression, LookupMatch, PlannedFetch, TitleSelector};
pub use titlestorage::TitleStorageClient;
pub use types::{BlobCatalog, BlobHandle, BlobKind, Event, PagingInfo, SaveDownload};
