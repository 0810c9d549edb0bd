//! Analysis data models
//!
//! Every field is optional: upstream data is frequently partial, and a
//! missing value must stay distinguishable from a real zero.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::source::SourceKind;

/// Message surfaced when every source failed at the transport level
pub const UNAVAILABLE: &str = "analysis unavailable";

/// Metric time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeBucket {
    /// One minute
    #[serde(rename = "1m")]
    M1,
    /// Five minutes
    #[serde(rename = "5m")]
    M5,
    /// One hour
    #[serde(rename = "1h")]
    H1,
    /// Six hours
    #[serde(rename = "6h")]
    H6,
    /// One day
    #[serde(rename = "24h")]
    H24,
}

impl TimeBucket {
    /// All buckets, shortest first
    pub const ALL: [Self; 5] = [Self::M1, Self::M5, Self::H1, Self::H6, Self::H24];

    /// Field suffix used by the token API (`volume_1h`)
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::H1 => "1h",
            Self::H6 => "6h",
            Self::H24 => "24h",
        }
    }
}

/// Per-window trading metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketMetrics {
    /// Price at the start of the window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Traded volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Swap count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swaps: Option<u64>,
    /// Buy count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buys: Option<u64>,
    /// Sell count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sells: Option<u64>,
    /// Net inflow volume (may be negative)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_in_volume: Option<f64>,
}

impl BucketMetrics {
    /// True when no metric is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.price.is_none()
            && self.volume.is_none()
            && self.swaps.is_none()
            && self.buys.is_none()
            && self.sells.is_none()
            && self.net_in_volume.is_none()
    }
}

/// Token identity and market data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct TokenInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fdv: Option<f64>,
    /// USD price; later price sources overwrite earlier ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Only windows with at least one known metric are present
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub buckets: BTreeMap<TimeBucket, BucketMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_supply: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circulating_supply: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biggest_pool_address: Option<String>,
    /// Pool open time, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundlers: Option<u64>,
    /// Either a buy URL string or an object of social/buy links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Value>,
}

impl TokenInfo {
    /// Metrics for one window
    #[must_use]
    pub fn bucket(&self, bucket: TimeBucket) -> Option<&BucketMetrics> {
        self.buckets.get(&bucket)
    }
}

/// One of the largest early buyers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopHolder {
    /// Wallet address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
    /// Holding status (`hold`, `sold`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Wallet tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Tags relative to this token
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maker_token_tags: Vec<String>,
}

/// Summary attached to the top-holder list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopHoldersMeta {
    /// Holder count as reported by the holder source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_count: Option<u64>,
    /// Free-form current status block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_now: Option<Value>,
}

/// Security verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityStatus {
    /// No notable risk
    Safe,
    /// Some risk factors
    Caution,
    /// High risk
    Danger,
    /// Source could not decide
    Unknown,
}

impl SecurityStatus {
    /// Parse a status label; accepts both `safe|caution|danger` and the
    /// `Good|Warning|Danger` labels some providers use.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "safe" | "good" => Some(Self::Safe),
            "caution" | "warning" | "warn" => Some(Self::Caution),
            "danger" | "bad" => Some(Self::Danger),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Lower-case label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Danger => "danger",
            Self::Unknown => "unknown",
        }
    }
}

/// Rug-check style security assessment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityInfo {
    /// Overall verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SecurityStatus>,
    /// Provider score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Risk factor descriptions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_factors: Vec<String>,
    /// Free-form provider message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether the token has been rugged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rugged: Option<bool>,
    /// Mint address echoed by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint: Option<String>,
    /// Liquidity as seen by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<f64>,
    /// When the provider assessed the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<String>,
    /// Provider links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
}

/// How one source fared in an aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Source
    pub source: SourceKind,
    /// Whether its payload was merged
    pub ok: bool,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Normalized per-address analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Address as requested
    pub address: String,
    /// Token data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenInfo>,
    /// Largest early buyers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_holders: Option<Vec<TopHolder>>,
    /// Top-holder summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_holders_meta: Option<TopHoldersMeta>,
    /// Security assessment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityInfo>,
    /// Per-source outcome, in evaluation order
    #[serde(default)]
    pub sources: Vec<SourceReport>,
    /// Completion time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set only when every source failed at the transport level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisRecord {
    /// Empty record for `address`
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Whether the popover should show the unavailable state
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.error.is_some()
    }

    /// Best known USD price
    #[must_use]
    pub fn price(&self) -> Option<f64> {
        self.token.as_ref().and_then(|t| t.price)
    }

    /// Holder count from token data, falling back to the holder source
    #[must_use]
    pub fn holder_count(&self) -> Option<u64> {
        self.token
            .as_ref()
            .and_then(|t| t.holder_count)
            .or_else(|| self.top_holders_meta.as_ref().and_then(|m| m.holder_count))
    }

    /// Token name
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.token.as_ref().and_then(|t| t.name.as_deref())
    }

    /// Token symbol
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        self.token.as_ref().and_then(|t| t.symbol.as_deref())
    }

    /// Number of sources whose payload was merged
    #[must_use]
    pub fn merged_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.ok).count()
    }
}
