//! Credential bundles, identity stubs and a mocked title-storage service

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use p256::SecretKey;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xbox_savegame_dl::{
    Config, CredentialBundle, CredentialStore, IdentityProvider, OAuthToken, RequestSigner,
    SaveManager, SignedSession, StorageConfig, TitleRegistry, TransferConfig, XboxToken,
};

pub const XUID: &str = "2535405139474186";
pub const GAMERTAG: &str = "Spark Fan";

fn token(value: &str, claims: serde_json::Value) -> XboxToken {
    XboxToken {
        issue_instant: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        not_after: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
        token: value.to_string(),
        display_claims: claims,
    }
}

/// A bundle with a freshly generated signing key and long-lived tokens
pub fn credential_bundle() -> CredentialBundle {
    let signer = RequestSigner::from_secret(SecretKey::random(&mut rand::rngs::OsRng));
    CredentialBundle {
        oauth: OAuthToken {
            token_type: "bearer".into(),
            expires_in: 3600,
            scope: "Xboxlive.signin Xboxlive.offline_access".into(),
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            user_id: None,
            issued: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
        },
        device_token: token("device", serde_json::json!({"xdi": {"did": "F7"}})),
        user_token: token("user", serde_json::json!({"xui": [{"uhs": "77"}]})),
        xsts_token: token(
            "xsts",
            serde_json::json!({"xui": [{"xid": XUID, "gtg": GAMERTAG, "uhs": "77"}]}),
        ),
        device_id: "0c6e2c1a-3b8e-4a8f-9f61-1e0d9c3b7a55".into(),
        signing_key: signer.export_pem().unwrap(),
    }
}

/// Identity provider that hands bundles back unchanged and counts calls
#[derive(Default)]
pub struct PassthroughIdentity {
    calls: AtomicUsize,
}

impl PassthroughIdentity {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for PassthroughIdentity {
    async fn refresh(
        &self,
        _session: &SignedSession,
        bundle: CredentialBundle,
    ) -> xbox_savegame_dl::Result<CredentialBundle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(bundle)
    }
}

/// A manager wired to a mock title-storage server
pub struct TestEnv {
    pub server: MockServer,
    pub dir: TempDir,
    pub identity: Arc<PassthroughIdentity>,
    pub manager: SaveManager,
}

impl TestEnv {
    /// `users` get a stored credential bundle; `games` is a registry document
    pub async fn new(users: &[&str], games: &str) -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        let config = Config {
            storage: StorageConfig {
                tokens_file: dir.path().join("user_tokens.json"),
                games_file: dir.path().join("games.json"),
                download_dir: dir.path().join("downloads"),
            },
            transfer: TransferConfig {
                titlestorage_url: server.uri(),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut credentials = CredentialStore::empty(&config.storage.tokens_file);
        for user in users {
            credentials.insert(*user, credential_bundle());
        }
        credentials.save().await.unwrap();

        let identity = Arc::new(PassthroughIdentity::default());
        let manager = SaveManager::from_parts(
            config,
            CredentialStore::load(dir.path().join("user_tokens.json"))
                .await
                .unwrap(),
            TitleRegistry::from_json_str(games).unwrap(),
            identity.clone(),
        );

        Self {
            server,
            dir,
            identity,
            manager,
        }
    }

    pub fn scid_path(&self, scid: &str) -> String {
        format!("/connectedstorage/users/xuid({})/scids/{}", XUID, scid)
    }

    /// Serve a single listing page
    pub async fn mount_listing(&self, scid: &str, names: &[&str]) {
        let blobs: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                serde_json::json!({
                    "fileName": name,
                    "displayName": format!("Slot {}", i + 1),
                    "etag": format!("\"0x8DB{}\"", i),
                    "clientFileTime": "2023-05-01T12:00:00.000Z",
                    "size": 512,
                })
            })
            .collect();

        Mock::given(method("GET"))
            .and(path(self.scid_path(scid)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "blobs": blobs,
                "pagingInfo": {"totalItems": names.len(), "continuationToken": null},
            })))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// Serve one blob body
    pub async fn mount_blob(&self, scid: &str, name: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", self.scid_path(scid), name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(1)
            .mount(&self.server)
            .await;
    }
}
