//! Icon fetchers
//!
//! The cache manager does not know where icons come from. It calls an
//! `IconFetcher`; `HttpFetcher` resolves Iconify style identifiers against an
//! Iconify compatible HTTP API and `BundledFetcher` serves assets shipped with
//! the application.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};

use crate::config::CacheConfig;
use crate::error::{CacheError, FetchError};
use crate::icon::{IconAsset, IconName, DEFAULT_CONTENT_TYPE};

/// Source of icon assets
///
/// Implementations must be cheap to call concurrently; the manager never
/// issues more than one fetch per identifier at a time.
pub trait IconFetcher: Send + Sync {
    /// Fetches the asset for `name`
    fn fetch<'a>(&'a self, name: &'a IconName) -> BoxFuture<'a, Result<IconAsset, FetchError>>;
}

/// Fetches SVG icons from an Iconify compatible API
///
/// `mdi:home` is requested as `{base_url}/mdi/home.svg`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    /// Creates a fetcher for `base_url` with the given per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Http(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Creates a fetcher from a cache configuration
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::new(config.api_base_url.clone(), config.fetch_timeout)
    }

    /// Creates a fetcher with a custom HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds the request URL for an identifier
    ///
    /// # Returns
    /// * `Ok(String)` for `prefix:name` identifiers
    /// * `Err(FetchError::Unsupported)` for identifiers without an icon set prefix
    pub fn icon_url(&self, name: &IconName) -> Result<String, FetchError> {
        let prefix = name
            .prefix()
            .ok_or_else(|| FetchError::Unsupported(format!("'{}' has no icon set prefix", name)))?;
        Ok(format!("{}/{}/{}.svg", self.base_url, prefix, name.icon()))
    }

    async fn fetch_svg(&self, name: &IconName) -> Result<IconAsset, FetchError> {
        let url = self.icon_url(name)?;

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let body = response.bytes().await?;

        // Iconify answers unknown icons with a 200 and a literal "404" body
        if body.is_empty() || &body[..] == b"404" {
            return Err(FetchError::NotFound);
        }

        Ok(IconAsset::new(body.to_vec(), content_type))
    }
}

impl IconFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, name: &'a IconName) -> BoxFuture<'a, Result<IconAsset, FetchError>> {
        Box::pin(self.fetch_svg(name))
    }
}

/// Serves icons from an in-memory bundle; unknown identifiers are `NotFound`
#[derive(Debug, Clone, Default)]
pub struct BundledFetcher {
    icons: HashMap<IconName, IconAsset>,
}

impl BundledFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an icon to the bundle
    pub fn with_icon(mut self, name: IconName, asset: IconAsset) -> Self {
        self.icons.insert(name, asset);
        self
    }
}

impl IconFetcher for BundledFetcher {
    fn fetch<'a>(&'a self, name: &'a IconName) -> BoxFuture<'a, Result<IconAsset, FetchError>> {
        let result = self.icons.get(name).cloned().ok_or(FetchError::NotFound);
        Box::pin(futures::future::ready(result))
    }
}
