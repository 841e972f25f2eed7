//! Token refresh against the Microsoft account and Xbox Live token services

use super::signing::SignedSession;
use crate::config::AuthConfig;
use crate::credentials::{CredentialBundle, OAuthToken, XboxToken};
use crate::error::{AuthError, Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Refreshes a credential bundle
///
/// The interactive sign-in that creates the first bundle happens elsewhere;
/// a provider only renews what is already stored.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Return a bundle whose tokens are all currently valid
    ///
    /// `session` is signed with the bundle's own key.
    async fn refresh(
        &self,
        session: &SignedSession,
        bundle: CredentialBundle,
    ) -> Result<CredentialBundle>;
}

/// Refresh chain used by Xbox Live: OAuth → user → device → XSTS
///
/// Each stage only runs when its token has expired, so a fresh bundle costs
/// no requests at all.
pub struct XboxLiveIdentity {
    config: AuthConfig,
}

impl XboxLiveIdentity {
    /// Create a provider for the configured OAuth client
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    async fn refresh_oauth(&self, session: &SignedSession, oauth: &OAuthToken) -> Result<OAuthToken> {
        let refresh_token = oauth.refresh_token.as_deref().ok_or_else(|| AuthError::RefreshFailed {
            stage: "oauth".into(),
            reason: "no refresh token stored".into(),
        })?;

        let scope = self.config.scopes.join(" ");
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("scope", scope.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = session
            .client()
            .post(&self.config.endpoints.oauth_token_url)
            .form(&form)
            .send()
            .await?;
        let mut token: OAuthToken = parse_token(response, "oauth").await?;
        token.issued = Utc::now();
        Ok(token)
    }

    async fn request_user_token(&self, session: &SignedSession, access_token: &str) -> Result<XboxToken> {
        let body = serde_json::json!({
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT",
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": format!("d={}", access_token),
            },
        });

        let response = session
            .client()
            .post(&self.config.endpoints.user_auth_url)
            .header("x-xbl-contract-version", "1")
            .json(&body)
            .send()
            .await?;
        parse_token(response, "user").await
    }

    async fn request_device_token(&self, session: &SignedSession, device_id: &str) -> Result<XboxToken> {
        let body = serde_json::json!({
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT",
            "Properties": {
                "AuthMethod": "ProofOfPossession",
                "Id": format!("{{{}}}", device_id),
                "DeviceType": "Win32",
                "Version": "10.0.0",
                "ProofKey": session.signer().proof_key()?,
            },
        });

        let response = session
            .send_signed(
                Method::POST,
                &self.config.endpoints.device_auth_url,
                json_headers(),
                &[],
                Some(serde_json::to_vec(&body)?),
            )
            .await?;
        parse_token(response, "device").await
    }

    async fn request_xsts_token(
        &self,
        session: &SignedSession,
        user_token: &XboxToken,
        device_token: &XboxToken,
    ) -> Result<XboxToken> {
        let body = serde_json::json!({
            "RelyingParty": "http://xboxlive.com",
            "TokenType": "JWT",
            "Properties": {
                "UserTokens": [user_token.token],
                "DeviceToken": device_token.token,
                "SandboxId": "RETAIL",
            },
        });

        let response = session
            .send_signed(
                Method::POST,
                &self.config.endpoints.xsts_auth_url,
                json_headers(),
                &[],
                Some(serde_json::to_vec(&body)?),
            )
            .await?;
        parse_token(response, "xsts").await
    }
}

#[async_trait]
impl IdentityProvider for XboxLiveIdentity {
    async fn refresh(
        &self,
        session: &SignedSession,
        mut bundle: CredentialBundle,
    ) -> Result<CredentialBundle> {
        let mut renewed_user = false;

        if !bundle.oauth.is_valid() {
            debug!("refreshing oauth token");
            let mut oauth = self.refresh_oauth(session, &bundle.oauth).await?;
            if oauth.refresh_token.is_none() {
                oauth.refresh_token = bundle.oauth.refresh_token.take();
            }
            bundle.oauth = oauth;
        }
        if !bundle.user_token.is_valid() {
            debug!("requesting user token");
            bundle.user_token = self
                .request_user_token(session, &bundle.oauth.access_token)
                .await?;
            renewed_user = true;
        }
        if !bundle.device_token.is_valid() {
            debug!("requesting device token");
            bundle.device_token = self.request_device_token(session, &bundle.device_id).await?;
        }
        if renewed_user || !bundle.xsts_token.is_valid() {
            debug!("requesting xsts token");
            bundle.xsts_token = self
                .request_xsts_token(session, &bundle.user_token, &bundle.device_token)
                .await?;
            info!(gamertag = ?bundle.xsts_token.gamertag(), "xsts token refreshed");
        }

        bundle.signing_key = session.signer().export_pem()?;
        Ok(bundle)
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("x-xbl-contract-version", HeaderValue::from_static("1"));
    headers
}

async fn parse_token<T: DeserializeOwned>(response: Response, stage: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let url = response.url().to_string();
        let text = response.text().await.unwrap_or_default();
        debug!(%stage, %status, body = %text, "token endpoint rejected request");
        return Err(Error::Upstream {
            status: status.as_u16(),
            url,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AuthError::RefreshFailed {
            stage: stage.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
