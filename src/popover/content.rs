//! Popover content
//!
//! Turns an analysis record into the rows the popover shows. Unknown values
//! render as `--`; a real zero renders as a number.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::analysis::AnalysisRecord;
use crate::detect::NetworkTag;

/// Placeholder for unknown values
pub const UNKNOWN: &str = "--";

const DEX_SEARCH: &str = "https://dexscreener.com/search?q=";

/// One label/value line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoRow {
    /// Row label
    pub label: &'static str,
    /// Rendered value
    pub value: String,
}

/// Popover body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "rows", rename_all = "snake_case")]
pub enum PopoverBody {
    /// Waiting for the aggregator
    Loading,
    /// Analysis rows
    Ready(Vec<InfoRow>),
    /// Every source failed
    Unavailable(String),
}

/// Everything the popover renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopoverView {
    /// Network badge (`EVM`, `TON`, `Solana`, `Unknown`)
    pub network: String,
    /// Full address (copy button)
    pub address: String,
    /// Shortened address
    pub short_address: String,
    /// Body
    pub body: PopoverBody,
    /// Buy button target; the button is disabled while `None`
    pub buy_url: Option<String>,
    /// Details button enabled
    pub details_enabled: bool,
}

impl PopoverView {
    /// Freshly opened popover
    #[must_use]
    pub fn loading(address: &str) -> Self {
        Self {
            network: NetworkTag::classify(address).map_or("Unknown", NetworkTag::label).to_string(),
            address: address.to_string(),
            short_address: short_address(address),
            body: PopoverBody::Loading,
            buy_url: None,
            details_enabled: false,
        }
    }

    /// Popover for a finished analysis
    #[must_use]
    pub fn from_record(address: &str, record: &AnalysisRecord) -> Self {
        Self::from_record_at(address, record, Utc::now())
    }

    /// As [`from_record`](Self::from_record) with an explicit clock
    #[must_use]
    pub fn from_record_at(address: &str, record: &AnalysisRecord, now: DateTime<Utc>) -> Self {
        let mut view = Self::loading(address);
        if let Some(error) = &record.error {
            view.body = PopoverBody::Unavailable(error.clone());
            return view;
        }
        view.body = PopoverBody::Ready(rows(record, now));
        view.buy_url = buy_url(record);
        view.details_enabled = true;
        view
    }

    /// Look up a row value by label
    #[must_use]
    pub fn row(&self, label: &str) -> Option<&str> {
        match &self.body {
            PopoverBody::Ready(rows) => rows
                .iter()
                .find(|r| r.label == label)
                .map(|r| r.value.as_str()),
            _ => None,
        }
    }
}

fn rows(record: &AnalysisRecord, now: DateTime<Utc>) -> Vec<InfoRow> {
    let token = record.token.as_ref();
    #[allow(clippy::cast_precision_loss)]
    let mut rows = vec![
        InfoRow {
            label: "Price",
            value: format_price(record.price()),
        },
        InfoRow {
            label: "MCap",
            value: format_short_number(token.and_then(|t| t.market_cap)),
        },
        InfoRow {
            label: "Holders",
            value: format_short_number(record.holder_count().map(|n| n as f64)),
        },
        InfoRow {
            label: "Bundlers",
            value: format_short_number(token.and_then(|t| t.bundlers).map(|n| n as f64)),
        },
        InfoRow {
            label: "Created",
            value: time_ago(token.and_then(|t| t.open_timestamp), now),
        },
    ];

    if let Some(status) = record.security.as_ref().and_then(|s| s.status) {
        let score = record.security.as_ref().and_then(|s| s.score);
        let value = match score {
            Some(score) => format!("{} ({})", status.as_str(), trim_number(score, 2)),
            None => status.as_str().to_string(),
        };
        rows.push(InfoRow {
            label: "Security",
            value,
        });
    }
    rows
}

/// `abcdef...uvwxyz` for anything longer than 12 characters
#[must_use]
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 12 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{head}...{tail}")
}

/// `$0.000123`
#[must_use]
pub fn format_price(price: Option<f64>) -> String {
    price.map_or_else(|| UNKNOWN.to_string(), |p| format!("${p:.6}"))
}

/// `1.2K`, `3.4M`, or the plain number below a thousand
#[must_use]
pub fn format_short_number(value: Option<f64>) -> String {
    let Some(n) = value.filter(|n| n.is_finite()) else {
        return UNKNOWN.to_string();
    };
    if n.abs() >= 1e6 {
        format!("{:.1}M", n / 1e6)
    } else if n.abs() >= 1e3 {
        format!("{:.1}K", n / 1e3)
    } else {
        trim_number(n, 3)
    }
}

fn trim_number(n: f64, decimals: usize) -> String {
    let s = format!("{n:.decimals$}");
    let s = if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s.as_str()
    };
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

/// `2d 3h ago`, `4h 10m ago`, `7m ago` or `just now`
#[must_use]
pub fn time_ago(unix: Option<i64>, now: DateTime<Utc>) -> String {
    let Some(ts) = unix.filter(|t| *t > 0) else {
        return UNKNOWN.to_string();
    };
    let ts_ms = if ts > 1_000_000_000_000 { ts } else { ts * 1000 };
    let diff = now.timestamp_millis() - ts_ms;
    if diff < 0 {
        return "just now".to_string();
    }

    let minutes = diff / 60_000;
    let hours = minutes / 60;
    let days = hours / 24;
    if days > 0 {
        format!("{days}d {}h ago", hours % 24)
    } else if hours > 0 {
        format!("{hours}h {}m ago", minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m ago")
    } else {
        "just now".to_string()
    }
}

/// Buy link: the token's `link` when it is a URL string, else
/// `link.buy_url`, else a DEX search for the token address.
#[must_use]
pub fn buy_url(record: &AnalysisRecord) -> Option<String> {
    let token = record.token.as_ref()?;
    match &token.link {
        Some(Value::String(url)) if !url.is_empty() => return Some(url.clone()),
        Some(Value::Object(links)) => {
            if let Some(url) = links.get("buy_url").and_then(Value::as_str) {
                return Some(url.to_string());
            }
        }
        _ => {}
    }
    token
        .address
        .as_deref()
        .map(|address| format!("{DEX_SEARCH}{address}"))
}
