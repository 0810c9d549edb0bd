//! Token analysis
//!
//! Five upstream sources are queried per address and merged into one
//! [`AnalysisRecord`]:
//!
//! | Source | Endpoint |
//! | --- | --- |
//! | token info | `{base_url}/token/{address}` |
//! | top holders | `{base_url}/token/{address}/top-buyers` |
//! | security | `{base_url}/token/{address}/rugcheck` |
//! | price | `{base_url}/token/{address}/price` |
//! | DEX price | `{dex_search_url}?q={address}` |

mod aggregator;
mod cache;
mod models;
pub mod normalize;
mod source;

pub use aggregator::{Aggregator, merge};
pub use cache::{CacheStats, RecordCache, cache_key};
pub use models::{
    AnalysisRecord, BucketMetrics, SecurityInfo, SecurityStatus, SourceReport, TimeBucket,
    TokenInfo, TopHolder, TopHoldersMeta, UNAVAILABLE,
};
pub use source::{HttpSource, SourceError, SourceKind, TokenSource};
