//! Per-user credential bundles and their JSON file store

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// OAuth2 token response from the Microsoft account token endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Token type (usually "bearer")
    pub token_type: String,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
    /// Granted scopes
    #[serde(default)]
    pub scope: String,
    /// Access token
    pub access_token: String,
    /// Refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Microsoft account user id
    #[serde(default)]
    pub user_id: Option<String>,
    /// When the token was issued (filled in locally)
    #[serde(default = "Utc::now")]
    pub issued: DateTime<Utc>,
}

impl OAuthToken {
    /// Whether the access token is still usable
    pub fn is_valid(&self) -> bool {
        self.issued + Duration::seconds(self.expires_in) > Utc::now()
    }
}

/// Token issued by one of the Xbox Live token services
///
/// The services answer in PascalCase; the store persists snake_case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XboxToken {
    /// Issue time
    #[serde(alias = "IssueInstant")]
    pub issue_instant: DateTime<Utc>,
    /// Expiry time
    #[serde(alias = "NotAfter")]
    pub not_after: DateTime<Utc>,
    /// Opaque token
    #[serde(alias = "Token")]
    pub token: String,
    /// Claims attached to the token (`xui` for user/XSTS, `xdi` for devices)
    #[serde(alias = "DisplayClaims", default)]
    pub display_claims: serde_json::Value,
}

impl XboxToken {
    /// Whether the token has not expired yet
    pub fn is_valid(&self) -> bool {
        self.not_after > Utc::now()
    }

    fn user_claim(&self, name: &str) -> Option<&str> {
        self.display_claims
            .get("xui")?
            .get(0)?
            .get(name)?
            .as_str()
            .filter(|v| !v.is_empty())
    }

    /// Xbox user id
    pub fn xuid(&self) -> Option<&str> {
        self.user_claim("xid")
    }

    /// Gamertag
    pub fn gamertag(&self) -> Option<&str> {
        self.user_claim("gtg")
    }

    /// User hash
    pub fn user_hash(&self) -> Option<&str> {
        self.user_claim("uhs")
    }

    /// `Authorization` header value for Xbox Live services
    pub fn authorization_header_value(&self) -> Option<String> {
        self.user_hash()
            .map(|uhs| format!("XBL3.0 x={};{}", uhs, self.token))
    }
}

/// Everything needed to make signed requests on behalf of one user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle {
    /// Microsoft account token
    pub oauth: OAuthToken,
    /// Device token
    pub device_token: XboxToken,
    /// User token
    pub user_token: XboxToken,
    /// Session (XSTS) token
    pub xsts_token: XboxToken,
    /// Device id used for the device token
    pub device_id: String,
    /// PEM encoded ECDSA P-256 signing key
    pub signing_key: String,
}

impl CredentialBundle {
    /// A bundle is usable only if its session token names an Xbox user
    pub fn is_valid(&self) -> bool {
        self.xsts_token.xuid().is_some()
    }
}

/// JSON file of credential bundles keyed by user id
///
/// Loaded once, rewritten wholesale on every [`save`](Self::save).
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    entries: BTreeMap<String, CredentialBundle>,
}

impl CredentialStore {
    /// Create an empty store that will be saved to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the store from disk
    ///
    /// A missing or empty file yields an empty store, as does a file that
    /// is not a valid token document (logged). Other I/O errors propagate.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(?path, "credential store not found, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        if data.trim().is_empty() {
            return Ok(Self::empty(path));
        }

        match serde_json::from_str::<BTreeMap<String, CredentialBundle>>(&data) {
            Ok(entries) => {
                info!(?path, count = entries.len(), "loaded user tokens");
                Ok(Self { path, entries })
            }
            Err(e) => {
                error!(?path, error = %e, "error decoding credential store, starting empty");
                Ok(Self::empty(path))
            }
        }
    }

    /// Write the whole store to disk
    ///
    /// Writes a sibling temp file and renames it over the store, so a crash
    /// mid-write leaves the previous document intact.
    pub async fn save(&self) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.entries)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = ?self.path, count = self.entries.len(), "saved user tokens");
        Ok(())
    }

    /// Bundle stored for a user
    pub fn get(&self, user_id: &str) -> Option<&CredentialBundle> {
        self.entries.get(user_id)
    }

    /// Whether a bundle exists for a user
    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    /// Store (or replace) the bundle of a user
    pub fn insert(&mut self, user_id: impl Into<String>, bundle: CredentialBundle) {
        self.entries.insert(user_id.into(), bundle);
    }

    /// Delete the bundle of a user
    pub fn remove(&mut self, user_id: &str) -> Option<CredentialBundle> {
        self.entries.remove(user_id)
    }

    /// Number of stored bundles
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_bundle;
    use tempfile::TempDir;

    #[test]
    fn xsts_claims_drive_identity() {
        let bundle = test_bundle("2535405139474186");
        assert!(bundle.is_valid());
        assert_eq!(bundle.xsts_token.xuid(), Some("2535405139474186"));
        assert_eq!(bundle.xsts_token.gamertag(), Some("Test Player"));
        assert_eq!(
            bundle.xsts_token.authorization_header_value().unwrap(),
            "XBL3.0 x=1234567890;xsts-token"
        );

        let mut anonymous = bundle.clone();
        anonymous.xsts_token.display_claims = serde_json::json!({"xui": [{"xid": ""}]});
        assert!(!anonymous.is_valid());
    }

    #[test]
    fn xbox_token_accepts_service_field_names() {
        let token: XboxToken = serde_json::from_str(
            r#"{
                "IssueInstant": "2024-03-01T10:00:00.1234567Z",
                "NotAfter": "2024-03-02T02:00:00.1234567Z",
                "Token": "eyJ...",
                "DisplayClaims": {"xui": [{"uhs": "42"}]}
            }"#,
        )
        .unwrap();

        assert_eq!(token.token, "eyJ...");
        assert_eq!(token.user_hash(), Some("42"));
        assert!(!token.is_valid());

        let persisted = serde_json::to_value(&token).unwrap();
        assert!(persisted.get("not_after").is_some());
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::load(dir.path().join("user_tokens.json"))
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn corrupt_or_empty_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("user_tokens.json");

        tokio::fs::write(&path, "").await.unwrap();
        assert!(CredentialStore::load(&path).await.unwrap().is_empty());

        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(CredentialStore::load(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_rewrites_whole_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("user_tokens.json");

        let mut store = CredentialStore::empty(&path);
        store.insert("alice", test_bundle("1"));
        store.insert("bob", test_bundle("2"));
        store.save().await.unwrap();

        let mut reloaded = CredentialStore::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("alice").unwrap(), &test_bundle("1"));

        reloaded.remove("alice");
        reloaded.save().await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        let keys: Vec<_> = raw.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["bob".to_string()]);
    }
}
