//! Payload normalizers
//!
//! One function per source maps its raw JSON into the shared record shape.
//! Absent or unparseable fields stay `None`; a zero in the payload stays a
//! zero. A normalizer returns `None` only when the payload as a whole has the
//! wrong shape.

use serde_json::{Map, Value};

use super::models::{
    BucketMetrics, SecurityInfo, SecurityStatus, TimeBucket, TokenInfo, TopHolder, TopHoldersMeta,
};
use crate::detect::NetworkTag;

/// Price, FDV and liquidity from a DEX search response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DexQuote {
    /// USD price of the base token
    pub price_usd: Option<f64>,
    /// Fully diluted valuation
    pub fdv: Option<f64>,
    /// Pool liquidity in USD
    pub liquidity_usd: Option<f64>,
    /// Pair address
    pub pair_address: Option<String>,
}

/// Number or numeric string
fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Non-negative integer, also from integral floats and strings
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn count(value: Option<&Value>) -> Option<u64> {
    if let Some(n) = value.and_then(Value::as_u64) {
        return Some(n);
    }
    let n = number(value)?;
    (n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64).then(|| n as u64)
}

/// Unix seconds; millisecond timestamps are scaled down
#[allow(clippy::cast_possible_truncation)]
fn timestamp(value: Option<&Value>) -> Option<i64> {
    let n = value
        .and_then(Value::as_i64)
        .or_else(|| number(value).map(|f| f as i64))?;
    if n <= 0 {
        return None;
    }
    Some(if n > 1_000_000_000_000 { n / 1000 } else { n })
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn first<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| object.get(*k))
        .find(|v| !v.is_null())
}

/// Token metadata payload
#[must_use]
pub fn token_info(payload: &Value) -> Option<TokenInfo> {
    let data = payload.as_object()?;
    let get = |key: &str| data.get(key);

    let mut info = TokenInfo {
        name: text(get("name")),
        symbol: text(get("symbol")),
        address: text(get("address")),
        logo: text(get("logo")),
        decimals: count(get("decimals")).and_then(|d| u32::try_from(d).ok()),
        market_cap: number(first(data, &["market_cap", "marketCap"])),
        fdv: number(get("fdv")),
        price: number(get("price")),
        holder_count: count(get("holder_count")),
        total_supply: number(get("total_supply")),
        max_supply: number(get("max_supply")),
        circulating_supply: number(get("circulating_supply")),
        liquidity: number(get("liquidity")),
        biggest_pool_address: text(get("biggest_pool_address")),
        open_timestamp: timestamp(get("open_timestamp")),
        bundlers: count(get("bundlers")),
        link: get("link").filter(|v| !v.is_null()).cloned(),
        ..TokenInfo::default()
    };

    for bucket in TimeBucket::ALL {
        let field = |name: &str| get(&format!("{name}_{}", bucket.suffix()));
        let metrics = BucketMetrics {
            price: number(field("price")),
            volume: number(field("volume")),
            swaps: count(field("swaps")),
            buys: count(field("buys")),
            sells: count(field("sells")),
            net_in_volume: number(field("net_in_volume")),
        };
        if !metrics.is_empty() {
            info.buckets.insert(bucket, metrics);
        }
    }

    Some(info)
}

/// Top-buyer payload: `holderInfo[]` plus summary fields
#[must_use]
pub fn top_holders(payload: &Value) -> Option<(Vec<TopHolder>, TopHoldersMeta)> {
    let data = payload.as_object()?;
    let holders = data
        .get("holderInfo")?
        .as_array()?
        .iter()
        .filter_map(Value::as_object)
        .map(|h| TopHolder {
            wallet: text(first(h, &["wallet_address", "wallet"])),
            status: text(h.get("status")),
            tags: strings(h.get("tags")),
            maker_token_tags: strings(h.get("maker_token_tags")),
        })
        .collect();

    let meta = TopHoldersMeta {
        holder_count: count(data.get("holder_count")),
        status_now: first(data, &["statusNow", "status_now"]).cloned(),
    };
    Some((holders, meta))
}

/// Best-effort text for one risk entry
fn risk_text(risk: &Value) -> Option<String> {
    match risk {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(fields) => {
            let label = ["name", "description", "value"].iter().find_map(|k| {
                match fields.get(*k)? {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }
            });
            Some(label.unwrap_or_else(|| risk.to_string()))
        }
        other => Some(other.to_string()),
    }
}

/// Security assessment payload
#[must_use]
pub fn security(payload: &Value) -> Option<SecurityInfo> {
    let data = payload.as_object()?;

    let risk_factors = first(data, &["risks", "risk_factors"])
        .and_then(Value::as_array)
        .map(|risks| risks.iter().filter_map(risk_text).collect())
        .unwrap_or_default();

    Some(SecurityInfo {
        status: data
            .get("status")
            .and_then(Value::as_str)
            .and_then(SecurityStatus::parse),
        score: number(data.get("score")),
        risk_factors,
        message: text(data.get("message")),
        rugged: data.get("rugged").and_then(Value::as_bool),
        mint: text(data.get("mint")),
        liquidity: number(data.get("liquidity")),
        detected_at: text(first(data, &["detectedAt", "detected_at"])),
        links: data.get("links").filter(|v| !v.is_null()).cloned(),
    })
}

/// Spot price payload: `usd_price`, falling back to `price`
#[must_use]
pub fn price(payload: &Value) -> Option<f64> {
    match payload {
        Value::Object(data) => number(data.get("usd_price")).or_else(|| number(data.get("price"))),
        Value::Number(_) | Value::String(_) => number(Some(payload)),
        _ => None,
    }
}

/// DEX search payload. Prefers the pair whose base token is `address`.
#[must_use]
pub fn dex_quote(payload: &Value, address: &str) -> Option<DexQuote> {
    let pairs = payload.get("pairs")?.as_array()?;
    let pair = pairs
        .iter()
        .find(|p| {
            p.pointer("/baseToken/address")
                .and_then(Value::as_str)
                .is_some_and(|a| NetworkTag::same_address(a, address))
        })
        .or_else(|| pairs.first())?;

    Some(DexQuote {
        price_usd: number(pair.get("priceUsd")),
        fdv: number(pair.get("fdv")),
        liquidity_usd: number(pair.pointer("/liquidity/usd")),
        pair_address: text(pair.get("pairAddress")),
    })
}
