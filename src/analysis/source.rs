//! Upstream data sources
//!
//! Each source fetches one raw JSON payload for an address. Failures are
//! reported as [`SourceError`] and never escape the aggregator.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::UpstreamConfig;
use crate::{Error, Result};

/// Upstream sources, in the fixed order their payloads are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Token metadata and market data
    TokenInfo,
    /// Top early buyers
    TopHolders,
    /// Security assessment: rug check, falling back to the plain security
    /// endpoint
    Security,
    /// Spot price
    Price,
    /// Redundant DEX price
    DexPrice,
}

impl SourceKind {
    /// Merge order
    pub const ALL: [Self; 5] = [
        Self::TokenInfo,
        Self::TopHolders,
        Self::Security,
        Self::Price,
        Self::DexPrice,
    ];

    /// Short name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TokenInfo => "token_info",
            Self::TopHolders => "top_holders",
            Self::Security => "security",
            Self::Price => "price",
            Self::DexPrice => "dex_price",
        }
    }

    /// Position in [`SourceKind::ALL`]
    #[must_use]
    pub fn order(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single source produced nothing
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Connection failure or timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Payload could not be interpreted
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Whether the request itself failed (as opposed to its payload)
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status(_))
    }
}

/// One upstream endpoint keyed by address
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Which source this is
    fn kind(&self) -> SourceKind;

    /// Fetch the raw payload for `address`
    async fn fetch(&self, address: &str) -> std::result::Result<Value, SourceError>;
}

/// HTTP GET source
#[derive(Debug, Clone)]
pub struct HttpSource {
    kind: SourceKind,
    client: Client,
    base: Url,
}

impl HttpSource {
    /// Create a source for `kind` rooted at `base`.
    ///
    /// For [`SourceKind::DexPrice`] `base` is the search endpoint itself;
    /// for every other kind it is the token API root.
    pub fn new(kind: SourceKind, client: Client, base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| Error::Config(format!("Invalid upstream URL {base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("Upstream URL {base} cannot be a base")));
        }
        Ok(Self { kind, client, base })
    }

    /// All five sources for `config`, in merge order
    pub fn standard_set(config: &UpstreamConfig) -> Result<Vec<Arc<dyn TokenSource>>> {
        let mut builder = Client::builder().timeout(config.timeout());
        if let Some(ua) = &config.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        let client = builder.build()?;

        SourceKind::ALL
            .into_iter()
            .map(|kind| {
                let base = match kind {
                    SourceKind::DexPrice => &config.dex_search_url,
                    _ => &config.base_url,
                };
                Ok(Arc::new(Self::new(kind, client.clone(), base)?) as Arc<dyn TokenSource>)
            })
            .collect()
    }

    /// Request URL for `address`
    #[must_use]
    pub fn url_for(&self, address: &str) -> Url {
        if self.kind == SourceKind::DexPrice {
            let mut url = self.base.clone();
            url.query_pairs_mut().append_pair("q", address);
            return url;
        }
        let leaf = match self.kind {
            SourceKind::TopHolders => Some("top-buyers"),
            SourceKind::Security => Some("rugcheck"),
            SourceKind::Price => Some("price"),
            SourceKind::TokenInfo | SourceKind::DexPrice => None,
        };
        self.token_url(address, leaf)
    }

    /// URL tried when the primary request fails, if this source has one
    #[must_use]
    pub fn fallback_url_for(&self, address: &str) -> Option<Url> {
        (self.kind == SourceKind::Security).then(|| self.token_url(address, Some("security")))
    }

    fn token_url(&self, address: &str, leaf: Option<&str>) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["token", address]);
            if let Some(leaf) = leaf {
                segments.push(leaf);
            }
        }
        url
    }

    async fn get_json(&self, url: Url) -> std::result::Result<Value, SourceError> {
        debug!(source = %self.kind, url = %url, "Fetching upstream");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| SourceError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl TokenSource for HttpSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, address: &str) -> std::result::Result<Value, SourceError> {
        match self.get_json(self.url_for(address)).await {
            Ok(payload) => Ok(payload),
            Err(e) => match self.fallback_url_for(address) {
                Some(url) => {
                    debug!(
                        source = %self.kind,
                        error = %e,
                        "Primary endpoint failed, trying fallback"
                    );
                    self.get_json(url).await
                }
                None => Err(e),
            },
        }
    }
}
