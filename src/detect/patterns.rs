//! Pattern registry: address shapes per network, length policy and denylists

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::{Error, Result};

/// Blockchain network an address shape belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkTag {
    /// EVM chains (`0x` + 40 hex)
    Evm,
    /// TON raw hex form (48 hex)
    Ton,
    /// Solana (base-58)
    Solana,
}

impl NetworkTag {
    /// Default overlap priority, highest first
    pub const DEFAULT_PRIORITY: [Self; 3] = [Self::Evm, Self::Ton, Self::Solana];

    /// Lower-case identifier
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Ton => "ton",
            Self::Solana => "solana",
        }
    }

    /// Badge label shown in the popover
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Evm => "EVM",
            Self::Ton => "TON",
            Self::Solana => "Solana",
        }
    }

    /// Classify a standalone address by its full shape, using default bounds.
    #[must_use]
    pub fn classify(address: &str) -> Option<Self> {
        static EVM: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("static regex"));
        static TON: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{48}$").expect("static regex"));
        static SOLANA: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("static regex")
        });

        if EVM.is_match(address) {
            Some(Self::Evm)
        } else if TON.is_match(address) {
            Some(Self::Ton)
        } else if SOLANA.is_match(address) {
            Some(Self::Solana)
        } else {
            None
        }
    }

    /// Whether addresses on this network compare case-insensitively
    #[must_use]
    pub fn case_insensitive(self) -> bool {
        matches!(self, Self::Evm | Self::Ton)
    }

    /// Canonical form of `address` for identity comparisons.
    ///
    /// Hex addresses (EVM, TON) are folded to lower case; base-58 and
    /// unclassified addresses are only trimmed, since their case is
    /// significant.
    #[must_use]
    pub fn canonical(address: &str) -> String {
        let address = address.trim();
        match Self::classify(address) {
            Some(tag) if tag.case_insensitive() => address.to_ascii_lowercase(),
            _ => address.to_string(),
        }
    }

    /// Whether `a` and `b` name the same address
    #[must_use]
    pub fn same_address(a: &str, b: &str) -> bool {
        Self::canonical(a) == Self::canonical(b)
    }

    fn default_regex(self) -> &'static str {
        match self {
            Self::Evm => r"0x[a-fA-F0-9]{40}",
            // Open-ended so an over-long run is rejected by the length filter
            // instead of being truncated into a false positive.
            Self::Ton => r"[0-9a-fA-F]{48,}",
            Self::Solana => r"[1-9A-HJ-NP-Za-km-z]{32,}",
        }
    }

    fn default_bounds(self) -> Option<LengthBounds> {
        match self {
            Self::Evm => None,
            Self::Ton => Some(LengthBounds { min: 48, max: 48 }),
            Self::Solana => Some(LengthBounds { min: 32, max: 44 }),
        }
    }

    fn default_denylist(self) -> &'static [&'static str] {
        match self {
            Self::Evm => &[
                "0x0000000000000000000000000000000000000000",
                "0x000000000000000000000000000000000000dEaD",
            ],
            Self::Ton => &["000000000000000000000000000000000000000000000000"],
            Self::Solana => &[
                "11111111111111111111111111111111",
                "So11111111111111111111111111111111111111112",
                "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL",
            ],
        }
    }
}

impl fmt::Display for NetworkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive length bounds applied to a whole match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBounds {
    /// Minimum length (inclusive)
    pub min: usize,
    /// Maximum length (inclusive)
    pub max: usize,
}

impl LengthBounds {
    /// Check a length against the bounds
    #[must_use]
    pub fn contains(&self, len: usize) -> bool {
        (self.min..=self.max).contains(&len)
    }
}

/// One registered address shape
#[derive(Debug, Clone)]
pub struct AddressPattern {
    /// Network this shape detects
    pub network: NetworkTag,
    regex: Regex,
    length: Option<LengthBounds>,
    denylist: HashSet<String>,
}

impl AddressPattern {
    /// Build a pattern from parts
    pub fn new(
        network: NetworkTag,
        pattern: &str,
        length: Option<LengthBounds>,
        denylist: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        if let Some(bounds) = length {
            if bounds.min > bounds.max {
                return Err(Error::pattern(network, "length bounds are inverted"));
            }
        }
        let regex = Regex::new(pattern).map_err(|e| Error::pattern(network, e.to_string()))?;
        let denylist = denylist
            .into_iter()
            .map(|a| normalize(network, &a))
            .collect();

        Ok(Self {
            network,
            regex,
            length,
            denylist,
        })
    }

    /// The compiled matcher
    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Length policy, if any
    #[must_use]
    pub fn length(&self) -> Option<LengthBounds> {
        self.length
    }

    /// Whether a candidate passes the length filter
    #[must_use]
    pub fn accepts_len(&self, len: usize) -> bool {
        self.length.is_none_or(|b| b.contains(len))
    }

    /// Whether a literal value is a known system/burn address
    #[must_use]
    pub fn is_denied(&self, value: &str) -> bool {
        self.denylist.contains(&normalize(self.network, value))
    }
}

fn normalize(network: NetworkTag, value: &str) -> String {
    if network.case_insensitive() {
        value.to_ascii_lowercase()
    } else {
        value.to_string()
    }
}

/// Ordered table of address patterns. Index order is overlap priority.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: Vec<AddressPattern>,
}

impl PatternRegistry {
    /// Registry with every network at its default shape, in default priority
    #[must_use]
    pub fn standard() -> Self {
        Self::from_config(&DetectionConfig::default())
            .expect("built-in patterns are valid")
    }

    /// Build the registry from detection config
    pub fn from_config(config: &DetectionConfig) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut patterns = Vec::with_capacity(config.networks.len());

        for &network in &config.networks {
            if !seen.insert(network) {
                return Err(Error::pattern(network, "network listed twice"));
            }
            let bounds = config
                .bounds
                .get(&network)
                .copied()
                .or_else(|| network.default_bounds());
            let denylist = network
                .default_denylist()
                .iter()
                .map(|s| (*s).to_string())
                .chain(config.denylist.get(&network).into_iter().flatten().cloned());

            patterns.push(AddressPattern::new(
                network,
                network.default_regex(),
                bounds,
                denylist,
            )?);
        }

        Ok(Self { patterns })
    }

    /// Build from explicit patterns (priority = slice order)
    #[must_use]
    pub fn with_patterns(patterns: Vec<AddressPattern>) -> Self {
        Self { patterns }
    }

    /// Patterns in priority order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &AddressPattern)> {
        self.patterns.iter().enumerate()
    }

    /// Number of registered patterns
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Look up the pattern for a network
    #[must_use]
    pub fn get(&self, network: NetworkTag) -> Option<&AddressPattern> {
        self.patterns.iter().find(|p| p.network == network)
    }

    /// Shortest length any pattern can accept. Used to skip trivially short text.
    #[must_use]
    pub fn min_len(&self) -> usize {
        self.patterns
            .iter()
            .map(|p| match (p.network, p.length) {
                (_, Some(b)) => b.min,
                (NetworkTag::Evm, None) => 42,
                (NetworkTag::Ton, None) => 48,
                (NetworkTag::Solana, None) => 32,
            })
            .min()
            .unwrap_or(0)
    }
}
