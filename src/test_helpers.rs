//! Shared fixtures for unit tests: key material, credential bundles and a
//! scriptable identity provider.

use crate::auth::{IdentityProvider, RequestSigner, SignedSession, XboxCredential};
use crate::credentials::{CredentialBundle, OAuthToken, XboxToken};
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use p256::SecretKey;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// PKCS#8 PEM key generated once per test binary
pub(crate) fn test_signing_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        let secret = SecretKey::random(&mut rand::rngs::OsRng);
        RequestSigner::from_secret(secret).export_pem().unwrap()
    })
}

pub(crate) fn test_session() -> SignedSession {
    SignedSession::from_pem_signing_key(test_signing_pem()).unwrap()
}

fn token(value: &str, claims: serde_json::Value) -> XboxToken {
    XboxToken {
        issue_instant: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        not_after: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
        token: value.to_string(),
        display_claims: claims,
    }
}

/// A bundle whose tokens are all valid for the given xuid
pub(crate) fn test_bundle(xuid: &str) -> CredentialBundle {
    CredentialBundle {
        oauth: OAuthToken {
            token_type: "bearer".into(),
            expires_in: 3600,
            scope: "Xboxlive.signin Xboxlive.offline_access".into(),
            access_token: "access-token".into(),
            refresh_token: Some("refresh-token".into()),
            user_id: Some("msa-user".into()),
            issued: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
        },
        device_token: token("device-token", serde_json::json!({"xdi": {"did": "F700"}})),
        user_token: token("user-token", serde_json::json!({"xui": [{"uhs": "1234567890"}]})),
        xsts_token: token(
            "xsts-token",
            serde_json::json!({"xui": [{"xid": xuid, "gtg": "Test Player", "uhs": "1234567890"}]}),
        ),
        device_id: "6f1c2a4e-0d7b-4a53-9a3e-4c9b8e2f1d10".into(),
        signing_key: test_signing_pem().to_string(),
    }
}

pub(crate) fn test_credential(xuid: &str) -> XboxCredential {
    XboxCredential::from_xsts(&test_bundle(xuid).xsts_token).unwrap()
}

/// What [`StubIdentity`] does when asked to refresh
#[derive(Clone, Copy)]
pub(crate) enum RefreshOutcome {
    /// Return the bundle unchanged apart from a new XSTS token value
    Renew,
    /// Return a bundle whose XSTS token names no user
    DropIdentity,
    /// Fail the refresh
    Fail,
}

pub(crate) struct StubIdentity {
    pub(crate) outcome: RefreshOutcome,
    pub(crate) calls: AtomicUsize,
}

impl StubIdentity {
    pub(crate) fn new(outcome: RefreshOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn refresh(
        &self,
        _session: &SignedSession,
        mut bundle: CredentialBundle,
    ) -> Result<CredentialBundle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            RefreshOutcome::Renew => {
                bundle.xsts_token.token = "renewed-xsts-token".into();
                Ok(bundle)
            }
            RefreshOutcome::DropIdentity => {
                bundle.xsts_token.display_claims = serde_json::json!({"xui": [{"uhs": "1"}]});
                Ok(bundle)
            }
            RefreshOutcome::Fail => Err(AuthError::RefreshFailed {
                stage: "oauth".into(),
                reason: "invalid_grant".into(),
            }
            .into()),
        }
    }
}
