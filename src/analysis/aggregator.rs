//! Analysis aggregator
//!
//! Fans out to every upstream source concurrently, waits for all of them to
//! settle, merges the successful payloads in a fixed order and broadcasts the
//! result. Concurrent calls for the same address share one fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::cache::{CacheStats, RecordCache, cache_key};
use super::models::{AnalysisRecord, SourceReport, TokenInfo, UNAVAILABLE};
use super::normalize;
use super::source::{HttpSource, SourceError, SourceKind, TokenSource};
use crate::Result;
use crate::bus::{AnalysisEvent, BusEvent, EventBus};
use crate::config::Config;
use crate::detect::NetworkTag;
use crate::store::{History, HistoryEntry};

type InFlight = Shared<BoxFuture<'static, Arc<AnalysisRecord>>>;

/// Multi-source analysis aggregator
pub struct Aggregator {
    sources: Vec<Arc<dyn TokenSource>>,
    bus: EventBus,
    cache: Option<RecordCache>,
    history: Option<History>,
    pending: Mutex<HashMap<String, InFlight>>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("sources", &self.sources.iter().map(|s| s.kind()).collect::<Vec<_>>())
            .field("cache", &self.cache)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl Aggregator {
    /// Create an aggregator over `sources` publishing on `bus`
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn TokenSource>>, bus: EventBus) -> Self {
        Self {
            sources,
            bus,
            cache: None,
            history: None,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// HTTP sources, cache and history from configuration
    pub fn from_config(config: &Config, bus: EventBus, history: Option<History>) -> Result<Self> {
        let mut aggregator = Self::new(HttpSource::standard_set(&config.upstream)?, bus);
        aggregator.cache = RecordCache::from_config(&config.cache);
        aggregator.history = history;
        Ok(aggregator)
    }

    /// Cache completed records
    #[must_use]
    pub fn with_cache(mut self, cache: RecordCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Record successful analyses in `history`
    #[must_use]
    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    /// Bus completions are published on
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Cache counters, if caching is enabled
    #[must_use]
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(RecordCache::stats)
    }

    /// Addresses with a fan-out in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    /// Analyse `address`. Never fails; see [`AnalysisRecord::error`].
    pub async fn analyze(self: &Arc<Self>, address: &str) -> Arc<AnalysisRecord> {
        let address = address.trim();
        let key = cache_key(address);

        if let Some(record) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            debug!(address, "Serving cached analysis");
            self.publish(address, Arc::clone(&record));
            return record;
        }

        let flight = {
            let mut pending = self.pending.lock();
            if let Some(flight) = pending.get(&key) {
                debug!(address, "Joining in-flight analysis");
                flight.clone()
            } else {
                let this = Arc::clone(self);
                let owned = address.to_string();
                let flight_key = key.clone();
                let flight = async move { this.complete(owned, flight_key).await }
                    .boxed()
                    .shared();
                pending.insert(key, flight.clone());
                flight
            }
        };

        flight.await
    }

    async fn complete(self: Arc<Self>, address: String, key: String) -> Arc<AnalysisRecord> {
        let record = Arc::new(self.fan_out(&address).await);

        if record.error.is_none() {
            if let Some(cache) = &self.cache {
                cache.insert(Arc::clone(&record));
            }
            if record.merged_sources() > 0
                && let Some(history) = &self.history
            {
                let entry = HistoryEntry {
                    address: address.clone(),
                    name: record.name().map(str::to_string),
                    symbol: record.symbol().map(str::to_string),
                    network: NetworkTag::classify(&address),
                    analysed_at: Utc::now(),
                };
                if let Err(e) = history.record(entry) {
                    warn!(address = %address, error = %e, "Failed to record history");
                }
            }
        }

        self.pending.lock().remove(&key);
        self.publish(&address, Arc::clone(&record));
        record
    }

    /// Query every source once and merge, bypassing cache and de-duplication
    pub async fn fan_out(&self, address: &str) -> AnalysisRecord {
        let results = join_all(self.sources.iter().map(|source| async move {
            let result = source.fetch(address).await;
            (source.kind(), result)
        }))
        .await;

        let record = merge(address, results);
        info!(
            address,
            merged = record.merged_sources(),
            sources = record.sources.len(),
            unavailable = record.is_unavailable(),
            "Analysis complete"
        );
        record
    }

    fn publish(&self, address: &str, record: Arc<AnalysisRecord>) {
        self.bus.publish(BusEvent::AnalysisReady(AnalysisEvent {
            address: address.to_string(),
            record,
        }));
    }
}

/// Merge settled source results into one record.
///
/// Results are applied in [`SourceKind`] order regardless of the order they
/// arrive in; overlapping fields are last-writer-wins in that order.
#[must_use]
pub fn merge(
    address: &str,
    mut results: Vec<(SourceKind, std::result::Result<Value, SourceError>)>,
) -> AnalysisRecord {
    results.sort_by_key(|(kind, _)| kind.order());

    let mut record = AnalysisRecord::new(address);
    let total = results.len();
    let mut transport_failures = 0;

    for (kind, result) in results {
        let outcome = match result {
            Ok(payload) => apply(&mut record, kind, address, &payload)
                .map_err(|reason| SourceError::Malformed(reason.to_string())),
            Err(e) => Err(e),
        };

        let report = match outcome {
            Ok(()) => SourceReport {
                source: kind,
                ok: true,
                error: None,
            },
            Err(e) => {
                if e.is_transport() {
                    transport_failures += 1;
                }
                debug!(source = %kind, error = %e, "Source contributed nothing");
                SourceReport {
                    source: kind,
                    ok: false,
                    error: Some(e.to_string()),
                }
            }
        };
        record.sources.push(report);
    }

    if total > 0 && transport_failures == total {
        record.error = Some(UNAVAILABLE.to_string());
    }
    record.completed_at = Some(Utc::now());
    record
}

fn apply(
    record: &mut AnalysisRecord,
    kind: SourceKind,
    address: &str,
    payload: &Value,
) -> std::result::Result<(), &'static str> {
    match kind {
        SourceKind::TokenInfo => {
            let info = normalize::token_info(payload).ok_or("expected an object")?;
            record.token = Some(info);
        }
        SourceKind::TopHolders => {
            let (holders, meta) =
                normalize::top_holders(payload).ok_or("expected holderInfo list")?;
            record.top_holders = Some(holders);
            record.top_holders_meta = Some(meta);
        }
        SourceKind::Security => {
            record.security = Some(normalize::security(payload).ok_or("expected an object")?);
        }
        SourceKind::Price => {
            let price = normalize::price(payload).ok_or("no price field")?;
            record.token.get_or_insert_with(TokenInfo::default).price = Some(price);
        }
        SourceKind::DexPrice => {
            let quote = normalize::dex_quote(payload, address).ok_or("no pairs")?;
            let token = record.token.get_or_insert_with(TokenInfo::default);
            if quote.price_usd.is_some() {
                token.price = quote.price_usd;
            }
            if token.fdv.is_none() {
                token.fdv = quote.fdv;
            }
            if token.liquidity.is_none() {
                token.liquidity = quote.liquidity_usd;
            }
            if token.biggest_pool_address.is_none() {
                token.biggest_pool_address = quote.pair_address;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    struct MockSource {
        kind: SourceKind,
        response: std::result::Result<Value, SourceError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl MockSource {
        fn ok(kind: SourceKind, payload: Value) -> Arc<Self> {
            Self::with(kind, Ok(payload), Duration::ZERO)
        }

        fn failing(kind: SourceKind, error: SourceError) -> Arc<Self> {
            Self::with(kind, Err(error), Duration::ZERO)
        }

        fn with(
            kind: SourceKind,
            response: std::result::Result<Value, SourceError>,
            delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                kind,
                response,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TokenSource for MockSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self, _address: &str) -> std::result::Result<Value, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.response.clone()
        }
    }

    const EVM: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
    const EVM_LOWER: &str = "0x52908400098527886e0f7030069857d2e4169ee7";
    const MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    fn all_ok() -> Vec<Arc<MockSource>> {
        vec![
            MockSource::ok(
                SourceKind::TokenInfo,
                json!({"name": "Bonk", "symbol": "BONK", "price": 1.0, "holder_count": 0}),
            ),
            MockSource::ok(
                SourceKind::TopHolders,
                json!({"holderInfo": [{"wallet": "W"}], "holder_count": 5}),
            ),
            MockSource::ok(SourceKind::Security, json!({"status": "safe", "score": 12})),
            MockSource::ok(SourceKind::Price, json!({"usd_price": 2.0})),
            MockSource::ok(
                SourceKind::DexPrice,
                json!({"pairs": [{"priceUsd": "3.0", "fdv": 900}]}),
            ),
        ]
    }

    fn aggregator(sources: &[Arc<MockSource>]) -> Arc<Aggregator> {
        let sources = sources
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn TokenSource>)
            .collect();
        Arc::new(Aggregator::new(sources, EventBus::default()))
    }

    #[tokio::test]
    async fn test_all_sources_merge_last_writer_wins() {
        let record = aggregator(&all_ok()).analyze("ADDR").await;

        assert_eq!(record.error, None);
        assert_eq!(record.merged_sources(), 5);
        assert_eq!(record.name(), Some("Bonk"));
        assert_eq!(record.price(), Some(3.0));
        assert_eq!(record.holder_count(), Some(0));
        assert_eq!(record.token.as_ref().unwrap().fdv, Some(900.0));
        assert_eq!(record.top_holders.as_ref().unwrap().len(), 1);
        assert_eq!(record.security.as_ref().unwrap().score, Some(12.0));
    }

    #[tokio::test]
    async fn test_two_failures_do_not_fail_the_rest() {
        let mut sources = all_ok();
        sources[1] = MockSource::failing(SourceKind::TopHolders, SourceError::Status(500));
        sources[4] = MockSource::failing(
            SourceKind::DexPrice,
            SourceError::Transport("timeout".into()),
        );

        let record = aggregator(&sources).analyze("ADDR").await;
        assert_eq!(record.error, None);
        assert_eq!(record.merged_sources(), 3);
        assert!(record.top_holders.is_none());
        assert_eq!(record.price(), Some(2.0));
        assert!(!record.sources[1].ok);
        assert_eq!(record.sources[4].source, SourceKind::DexPrice);
    }

    #[tokio::test]
    async fn test_every_transport_failure_is_unavailable() {
        let sources: Vec<_> = SourceKind::ALL
            .into_iter()
            .map(|k| MockSource::failing(k, SourceError::Transport("refused".into())))
            .collect();

        let record = aggregator(&sources).analyze("ADDR").await;
        assert_eq!(record.error.as_deref(), Some(UNAVAILABLE));
        assert!(record.token.is_none());
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_not_unavailable() {
        let mut sources: Vec<_> = SourceKind::ALL
            .into_iter()
            .map(|k| MockSource::failing(k, SourceError::Transport("refused".into())))
            .collect();
        sources[0] = MockSource::ok(SourceKind::TokenInfo, json!("not an object"));

        let record = aggregator(&sources).analyze("ADDR").await;
        assert_eq!(record.error, None);
        assert!(record.token.is_none());
        assert_eq!(record.merged_sources(), 0);
    }

    #[test]
    fn test_merge_order_ignores_arrival_order() {
        let results = vec![
            (SourceKind::DexPrice, Ok(json!({"pairs": [{"priceUsd": 3}]}))),
            (SourceKind::Price, Ok(json!({"price": 2}))),
            (SourceKind::TokenInfo, Ok(json!({"price": 1}))),
        ];
        let record = merge("A", results);
        assert_eq!(record.price(), Some(3.0));
        let order: Vec<_> = record.sources.iter().map(|s| s.source).collect();
        assert_eq!(
            order,
            vec![SourceKind::TokenInfo, SourceKind::Price, SourceKind::DexPrice]
        );
    }

    #[test]
    fn test_price_source_without_token_info() {
        let record = merge("A", vec![(SourceKind::Price, Ok(json!({"usd_price": 0})))]);
        assert_eq!(record.price(), Some(0.0));
        assert!(record.name().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_fan_out() {
        let slow = MockSource::with(
            SourceKind::TokenInfo,
            Ok(json!({"name": "Slow"})),
            Duration::from_millis(50),
        );
        let agg = aggregator(std::slice::from_ref(&slow));

        let (a, b) = tokio::join!(agg.analyze(EVM), agg.analyze(EVM_LOWER));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
        assert_eq!(agg.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_case_distinct_mints_are_fetched_separately() {
        let slow = MockSource::with(
            SourceKind::TokenInfo,
            Ok(json!({"name": "Slow"})),
            Duration::from_millis(50),
        );
        let agg = aggregator(std::slice::from_ref(&slow));
        let lower = MINT.to_lowercase();

        let (a, b) = tokio::join!(agg.analyze(MINT), agg.analyze(&lower));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.address, MINT);
        assert_eq!(b.address, lower);
        assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_completion_is_broadcast() {
        let agg = aggregator(&all_ok());
        let mut overlay = agg.bus().subscribe();
        let mut panel = agg.bus().subscribe();

        agg.analyze(EVM).await;
        assert_eq!(overlay.analysis_for(EVM_LOWER).await.unwrap().name(), Some("Bonk"));
        assert!(panel.analysis_for(EVM).await.is_some());
    }

    #[tokio::test]
    async fn test_cache_serves_second_call() {
        let sources = all_ok();
        let list = sources
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn TokenSource>)
            .collect();
        let agg = Arc::new(
            Aggregator::new(list, EventBus::default())
                .with_cache(RecordCache::new(Duration::from_secs(60), 10)),
        );

        agg.analyze(EVM).await;
        agg.analyze(EVM_LOWER).await;
        assert_eq!(sources[0].calls.load(Ordering::SeqCst), 1);
        assert_eq!(agg.cache_stats().unwrap().hits, 1);

        agg.analyze(MINT).await;
        agg.analyze(&MINT.to_lowercase()).await;
        assert_eq!(sources[0].calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unavailable_records_are_not_cached() {
        let failing = MockSource::failing(SourceKind::Price, SourceError::Status(503));
        let agg = Arc::new(
            Aggregator::new(vec![failing.clone() as Arc<dyn TokenSource>], EventBus::default())
                .with_cache(RecordCache::new(Duration::from_secs(60), 10)),
        );

        agg.analyze("A").await;
        agg.analyze("A").await;
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_success_recorded_in_history() {
        let history = History::new(Arc::new(MemoryStore::new()), 10);
        let list = all_ok()
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn TokenSource>)
            .collect();
        let agg = Arc::new(Aggregator::new(list, EventBus::default()).with_history(history.clone()));

        agg.analyze("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v").await;
        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].symbol.as_deref(), Some("BONK"));
        assert_eq!(entries[0].network, Some(NetworkTag::Solana));
    }
}
