//! Authenticated, signed sessions for a user
//!
//! - [`signing`] - request signer and signed HTTP session
//! - [`identity`] - token refresh chain
//!
//! [`AuthSessionProvider::acquire`] turns a stored credential bundle into a
//! live session, refreshing and persisting the bundle on the way.

mod identity;
mod signing;


pub use identity::{IdentityProvider, XboxLiveIdentity};
pub use signing::{RequestSigner, SignedSession};

use crate::credentials::{CredentialStore, XboxToken};
use crate::error::{AuthError, Result};
use crate::types::Event;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{error, info, warn};

/// Identity and authorization derived from a session token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XboxCredential {
    /// Xbox user id
    pub xuid: String,
    /// Gamertag, when the token carries one
    pub gamertag: Option<String>,
    /// `XBL3.0 x=<uhs>;<token>`
    pub authorization_header: String,
}

impl XboxCredential {
    /// Derive the credential from an XSTS token
    ///
    /// Returns `None` when the token names no user.
    pub fn from_xsts(token: &XboxToken) -> Option<Self> {
        Some(Self {
            xuid: token.xuid()?.to_string(),
            gamertag: token.gamertag().map(str::to_string),
            authorization_header: token.authorization_header_value()?,
        })
    }

    /// Name used in archive file names: the gamertag or `User_<xuid>`
    pub fn display_name(&self) -> String {
        match &self.gamertag {
            Some(gamertag) => gamertag.clone(),
            None => format!("User_{}", self.xuid),
        }
    }
}

/// A signed session bound to a freshly refreshed credential
#[derive(Clone, Debug)]
pub struct AuthSession {
    /// The signed HTTP session
    pub session: SignedSession,
    /// The credential to authorize requests with
    pub credential: XboxCredential,
}

/// Produces signed sessions from the credential store
#[derive(Clone)]
pub struct AuthSessionProvider {
    credentials: Arc<Mutex<CredentialStore>>,
    identity: Arc<dyn IdentityProvider>,
    event_tx: broadcast::Sender<Event>,
}

impl AuthSessionProvider {
    /// Create a provider over a loaded store
    pub fn new(
        credentials: CredentialStore,
        identity: Arc<dyn IdentityProvider>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            credentials: Arc::new(Mutex::new(credentials)),
            identity,
            event_tx,
        }
    }

    /// Refresh the stored credentials of `user_id` and open a session
    ///
    /// # Errors
    ///
    /// - [`AuthError::NoCredentials`] if nothing is stored (no request is made)
    /// - [`AuthError::MissingIdentity`] if the refreshed token names no user;
    ///   the stored bundle is deleted
    /// - any refresh failure, after the stored bundle has been deleted
    pub async fn acquire(&self, user_id: &str) -> Result<AuthSession> {
        let stored = self.credentials.lock().await.get(user_id).cloned();
        let Some(bundle) = stored else {
            info!(%user_id, "no tokens found for user");
            return Err(AuthError::NoCredentials {
                user_id: user_id.to_string(),
            }
            .into());
        };

        // The store is not locked while refreshing; concurrent refreshes of
        // the same user are last-writer-wins.
        let refreshed = match SignedSession::from_pem_signing_key(&bundle.signing_key) {
            Ok(session) => {
                let result = self.identity.refresh(&session, bundle).await;
                result.map(|bundle| (session, bundle))
            }
            Err(e) => Err(e),
        };

        let (session, bundle) = match refreshed {
            Ok(pair) => pair,
            Err(e) => {
                error!(%user_id, error = %e, "token refresh failed, evicting credentials");
                self.evict(user_id).await;
                return Err(e);
            }
        };

        let Some(credential) = XboxCredential::from_xsts(&bundle.xsts_token) else {
            warn!(%user_id, "xsts token carries no xuid after refresh");
            self.evict(user_id).await;
            return Err(AuthError::MissingIdentity {
                user_id: user_id.to_string(),
            }
            .into());
        };

        {
            let mut store = self.credentials.lock().await;
            store.insert(user_id, bundle);
            store.save().await?;
        }

        info!(%user_id, gamertag = ?credential.gamertag, "tokens refreshed");
        self.event_tx
            .send(Event::Authenticated {
                user_id: user_id.to_string(),
                gamertag: credential.gamertag.clone(),
            })
            .ok();

        Ok(AuthSession {
            session,
            credential,
        })
    }

    /// Whether credentials are stored for a user
    pub async fn has_credentials(&self, user_id: &str) -> bool {
        self.credentials.lock().await.contains(user_id)
    }

    async fn evict(&self, user_id: &str) {
        let mut store = self.credentials.lock().await;
        if store.remove(user_id).is_none() {
            return;
        }
        if let Err(e) = store.save().await {
            error!(%user_id, error = %e, "failed to persist credential eviction");
        }
        drop(store);
        self.event_tx
            .send(Event::CredentialsEvicted {
                user_id: user_id.to_string(),
            })
            .ok();
    }
}
