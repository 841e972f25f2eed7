//! Title-storage (connected storage) HTTP client
//!
//! Lists the blobs a title keeps for a user and downloads single blobs.
//! Every request is signed with the caller's session and authorized with
//! the user's XSTS credential.

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::auth::{SignedSession, XboxCredential};
use crate::error::{Error, Result};
use crate::types::BlobCatalog;
use reqwest::header::{ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, Response};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONTRACT_VERSION: &str = "107";

/// Client for one title-storage deployment
#[derive(Clone, Debug)]
pub struct TitleStorageClient {
    base_url: String,
}

impl TitleStorageClient {
    /// Create a client for a base URL such as `https://titlestorage.xboxlive.com`
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn scid_url(&self, xuid: &str, scid: &str) -> String {
        format!(
            "{}/connectedstorage/users/xuid({})/scids/{}",
            self.base_url, xuid, scid
        )
    }

    /// List every blob of a service config id
    ///
    /// Follows continuation tokens until the service reports none, passing
    /// the number of blobs collected so far as `skipItems`. A failing page
    /// fails the whole listing.
    pub async fn list_blobs(
        &self,
        session: &SignedSession,
        credential: &XboxCredential,
        scid: &str,
        pfn: &str,
    ) -> Result<BlobCatalog> {
        let url = self.scid_url(&credential.xuid, scid);
        let headers = common_headers(credential, pfn)?;

        let response = session
            .send_signed(Method::GET, &url, headers.clone(), &[], None)
            .await?;
        let mut catalog: BlobCatalog = read_json(response).await?;
        let mut pages = 1usize;

        while let Some(token) = catalog.paging_info.continuation_token.take() {
            let query = [
                ("skipItems", catalog.blobs.len().to_string()),
                ("continuationToken", token),
            ];
            debug!(%scid, collected = catalog.blobs.len(), "fetching next blob page");

            let response = session
                .send_signed(Method::GET, &url, headers.clone(), &query, None)
                .await?;
            let page: BlobCatalog = read_json(response).await?;

            catalog.blobs.extend(page.blobs);
            catalog.paging_info = page.paging_info;
            pages += 1;
        }

        info!(%scid, blobs = catalog.blobs.len(), pages, "listed blobs");
        Ok(catalog)
    }

    /// Download one blob to `target`, creating parent directories
    ///
    /// The body is written as received; an existing file is replaced.
    pub async fn fetch_blob(
        &self,
        session: &SignedSession,
        credential: &XboxCredential,
        scid: &str,
        pfn: &str,
        remote_name: &str,
        target: &Path,
    ) -> Result<PathBuf> {
        let url = format!("{}/{}", self.scid_url(&credential.xuid, scid), remote_name);
        debug!(remote = %remote_name, ?target, "downloading blob");

        let response = session
            .send_signed(Method::GET, &url, common_headers(credential, pfn)?, &[], None)
            .await?;
        let response = check_status(response)?;
        let bytes = response.bytes().await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(target, &bytes).await?;

        debug!(?target, size = bytes.len(), "blob written");
        Ok(target.to_path_buf())
    }
}

fn common_headers(credential: &XboxCredential, pfn: &str) -> Result<HeaderMap> {
    let header_value = |key: &str, value: &str| {
        HeaderValue::from_str(value).map_err(|e| Error::Config {
            message: format!("invalid {} header value: {}", key, e),
            key: Some(key.to_string()),
        })
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        header_value("authorization", &credential.authorization_header)?,
    );
    headers.insert(
        "x-xbl-contract-version",
        HeaderValue::from_static(CONTRACT_VERSION),
    );
    headers.insert("x-xbl-pfn", header_value("pfn", pfn)?);
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));
    Ok(headers)
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(Error::Upstream {
        status: status.as_u16(),
        url: response.url().to_string(),
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = check_status(response)?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
