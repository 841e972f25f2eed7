//! Xbox Live request signing
//!
//! Requests to device, XSTS and title-storage endpoints carry a `Signature`
//! header: an ECDSA P-256 / SHA-256 signature over the request, prefixed by
//! the signature version and a Windows FILETIME timestamp.

use crate::error::{AuthError, Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use p256::SecretKey;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response};
use tracing::debug;

const SIGNATURE_VERSION: u32 = 1;
/// Only this many body bytes are covered by the signature
const MAX_SIGNED_BODY: usize = 8192;
/// Seconds between 1601-01-01 and 1970-01-01
const FILETIME_EPOCH_OFFSET: i64 = 11_644_473_600;

/// Signs requests with a user's ECDSA P-256 key
#[derive(Clone)]
pub struct RequestSigner {
    secret: SecretKey,
    signing_key: SigningKey,
}

impl RequestSigner {
    /// Reconstruct a signer from a PEM key (PKCS#8 or SEC1)
    pub fn from_pem(pem: &str) -> Result<Self> {
        let secret = match SecretKey::from_pkcs8_pem(pem) {
            Ok(secret) => secret,
            Err(pkcs8_err) => {
                SecretKey::from_sec1_pem(pem).map_err(|_| AuthError::InvalidSigningKey {
                    reason: pkcs8_err.to_string(),
                })?
            }
        };
        Ok(Self::from_secret(secret))
    }

    /// Wrap an existing secret key
    pub fn from_secret(secret: SecretKey) -> Self {
        let signing_key = SigningKey::from(&secret);
        Self {
            secret,
            signing_key,
        }
    }

    /// Export the key as PKCS#8 PEM for the credential store
    pub fn export_pem(&self) -> Result<String> {
        let pem = self
            .secret
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::Signing(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// Public key as the JWK expected in device token requests
    pub fn proof_key(&self) -> Result<serde_json::Value> {
        let point = self.secret.public_key().to_encoded_point(false);
        let (Some(x), Some(y)) = (point.x(), point.y()) else {
            return Err(Error::Signing("public key has no affine coordinates".into()));
        };

        Ok(serde_json::json!({
            "kty": "EC",
            "x": URL_SAFE_NO_PAD.encode(x),
            "y": URL_SAFE_NO_PAD.encode(y),
            "crv": "P-256",
            "alg": "ES256",
            "use": "sig",
        }))
    }

    /// `Signature` header value for one request
    pub fn sign(
        &self,
        method: &Method,
        path_and_query: &str,
        authorization: &str,
        body: &[u8],
        timestamp: DateTime<Utc>,
    ) -> String {
        let filetime = to_filetime(timestamp);
        let payload = signing_payload(method, path_and_query, authorization, body, filetime);
        let signature: Signature = self.signing_key.sign(&payload);

        let mut header = Vec::with_capacity(4 + 8 + 64);
        header.extend_from_slice(&SIGNATURE_VERSION.to_be_bytes());
        header.extend_from_slice(&filetime.to_be_bytes());
        header.extend_from_slice(&signature.to_bytes());
        STANDARD.encode(header)
    }

    #[cfg(test)]
    pub(crate) fn verifying_key(&self) -> &p256::ecdsa::VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").finish_non_exhaustive()
    }
}

/// Windows FILETIME (100ns ticks since 1601) of a timestamp
pub(crate) fn to_filetime(timestamp: DateTime<Utc>) -> u64 {
    let secs = (timestamp.timestamp() + FILETIME_EPOCH_OFFSET) as u64;
    secs * 10_000_000 + u64::from(timestamp.timestamp_subsec_nanos()) / 100
}

/// Bytes covered by the signature, each field NUL-terminated
pub(crate) fn signing_payload(
    method: &Method,
    path_and_query: &str,
    authorization: &str,
    body: &[u8],
    filetime: u64,
) -> Vec<u8> {
    let body = &body[..body.len().min(MAX_SIGNED_BODY)];
    let mut payload = Vec::with_capacity(64 + path_and_query.len() + authorization.len() + body.len());

    payload.extend_from_slice(&SIGNATURE_VERSION.to_be_bytes());
    payload.push(0);
    payload.extend_from_slice(&filetime.to_be_bytes());
    payload.push(0);
    payload.extend_from_slice(method.as_str().to_ascii_uppercase().as_bytes());
    payload.push(0);
    payload.extend_from_slice(path_and_query.as_bytes());
    payload.push(0);
    payload.extend_from_slice(authorization.as_bytes());
    payload.push(0);
    payload.extend_from_slice(body);
    payload.push(0);
    payload
}

/// HTTP client that signs every request it sends
///
/// Each [`SaveManager::acquire`](crate::SaveManager::acquire) opens its own
/// session; nothing is shared between sessions.
#[derive(Clone, Debug)]
pub struct SignedSession {
    client: Client,
    signer: RequestSigner,
}

impl SignedSession {
    /// Create a session around a signer
    pub fn new(signer: RequestSigner) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("xbox-savegame-dl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, signer })
    }

    /// Create a session from a stored PEM signing key
    pub fn from_pem_signing_key(pem: &str) -> Result<Self> {
        Self::new(RequestSigner::from_pem(pem)?)
    }

    /// Unsigned client for endpoints that do not check signatures
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The signer
    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    /// Sign and send a request
    pub async fn send_signed(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        query: &[(&str, String)],
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let mut builder = self.client.request(method, url).headers(headers);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let mut request = builder.build()?;

        let path_and_query = match request.url().query() {
            Some(q) => format!("{}?{}", request.url().path(), q),
            None => request.url().path().to_string(),
        };
        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = request
            .body()
            .and_then(|b| b.as_bytes())
            .unwrap_or_default();

        let signature = self.signer.sign(
            request.method(),
            &path_and_query,
            &authorization,
            body,
            Utc::now(),
        );
        let value =
            HeaderValue::from_str(&signature).map_err(|e| Error::Signing(e.to_string()))?;
        request.headers_mut().insert("Signature", value);

        debug!(method = %request.method(), url = %request.url(), "sending signed request");
        Ok(self.client.execute(request).await?)
    }
}
