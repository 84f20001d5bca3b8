// Manifest API: resolves an asset id to the DASH manifest text.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::error::ManifestFetchError;

#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Return the decoded manifest document for `asset_id`.
    async fn fetch_manifest(&self, asset_id: &str) -> Result<String, ManifestFetchError>;
}

#[derive(Debug, Deserialize)]
struct PlaylistResponse {
    #[serde(alias = "Playlist")]
    playlist: String,
}

/// Fetches `{origin}/{asset_id}`, a JSON object whose `playlist` field holds
/// the base64-encoded manifest.
#[derive(Debug, Clone)]
pub struct CdnManifestSource {
    http_client: Client,
    origin: String,
    headers: HeaderMap,
}

impl CdnManifestSource {
    pub fn new(http_client: Client, origin: impl Into<String>) -> Self {
        Self {
            http_client,
            origin: origin.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Headers attached to manifest requests, such as `Authorization`.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// URL of the manifest API entry for `asset_id`.
    pub fn endpoint(&self, asset_id: &str) -> Result<Url, ManifestFetchError> {
        let invalid = |reason: String| ManifestFetchError::InvalidUrl {
            input: self.origin.clone(),
            reason,
        };
        let mut base = Url::parse(&self.origin).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("origin cannot be used as a base URL".to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        // pushed as one path segment so the id is percent-encoded
        base.path_segments_mut()
            .map_err(|()| invalid("origin cannot be used as a base URL".to_string()))?
            .pop_if_empty()
            .push(asset_id);
        Ok(base)
    }
}

#[async_trait]
impl ManifestSource for CdnManifestSource {
    #[instrument(skip(self), fields(origin = %self.origin))]
    async fn fetch_manifest(&self, asset_id: &str) -> Result<String, ManifestFetchError> {
        let url = self.endpoint(asset_id)?;
        debug!(url = %url, "Requesting manifest");

        let response = self
            .http_client
            .get(url.clone())
            .headers(self.headers.clone())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ManifestFetchError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        let text = decode_playlist(&body)?;
        debug!(length = text.len(), "Manifest received");
        Ok(text)
    }
}

/// Decode the JSON envelope returned by the manifest API.
pub fn decode_playlist(body: &[u8]) -> Result<String, ManifestFetchError> {
    let envelope: PlaylistResponse = serde_json::from_slice(body)?;
    let raw = STANDARD.decode(envelope.playlist.trim())?;
    Ok(String::from_utf8(raw)?)
}
