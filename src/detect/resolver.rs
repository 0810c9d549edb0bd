//! Match resolver: runs every registered pattern over a logical string and
//! merges the hits into one sorted, non-overlapping list.

use serde::Serialize;
use tracing::trace;

use super::patterns::{NetworkTag, PatternRegistry};

/// A detected address inside a logical string (byte offsets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressMatch {
    /// The literal address text
    pub value: String,
    /// Network whose pattern produced the match
    pub network: NetworkTag,
    /// Start offset (inclusive)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
}

impl AddressMatch {
    /// Whether two matches share any byte
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Resolve all addresses in `text`.
///
/// On overlap the match from the earlier-registered pattern is kept; the
/// result is sorted by `start` and satisfies `end_i <= start_{i+1}`.
#[must_use]
pub fn resolve(registry: &PatternRegistry, text: &str) -> Vec<AddressMatch> {
    if text.len() < registry.min_len() {
        return Vec::new();
    }

    let mut candidates: Vec<(usize, AddressMatch)> = Vec::new();

    for (priority, pattern) in registry.iter() {
        for m in pattern.regex().find_iter(text) {
            let value = m.as_str();
            if !pattern.accepts_len(value.len()) {
                trace!(network = %pattern.network, len = value.len(), "Length filter rejected candidate");
                continue;
            }
            if pattern.is_denied(value) {
                trace!(network = %pattern.network, address = value, "Skipped system address");
                continue;
            }
            candidates.push((
                priority,
                AddressMatch {
                    value: value.to_string(),
                    network: pattern.network,
                    start: m.start(),
                    end: m.end(),
                },
            ));
        }
    }

    merge(candidates)
}

/// Merge prioritized candidates into a non-overlapping list.
///
/// A lower `priority` index beats any overlapping candidate with a higher
/// index, regardless of which one starts first.
fn merge(mut candidates: Vec<(usize, AddressMatch)>) -> Vec<AddressMatch> {
    candidates.sort_by(|(pa, a), (pb, b)| pa.cmp(pb).then(a.start.cmp(&b.start)));

    let mut accepted: Vec<AddressMatch> = Vec::with_capacity(candidates.len());
    for (_, candidate) in candidates {
        if accepted.iter().any(|kept| kept.overlaps(&candidate)) {
            continue;
        }
        accepted.push(candidate);
    }

    accepted.sort_by_key(|m| m.start);
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::patterns::{AddressPattern, LengthBounds};
    use pretty_assertions::assert_eq;

    const EVM_ADDR: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
    const SOL_ADDR: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    // No zeros, so everything after "0" is also a 41-char base-58 run.
    const DUAL_ADDR: &str = "0xa1b2c3d4e5f6a7b8c9d1e2f3a4b5c6d7e8f9a1b2";

    fn assert_non_overlapping(matches: &[AddressMatch]) {
        for pair in matches.windows(2) {
            assert!(pair[0].end <= pair[1].start, "{pair:?} overlap");
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(resolve(&PatternRegistry::standard(), "").is_empty());
    }

    #[test]
    fn test_scenario_denylisted_mint_dropped() {
        let text = "check 0x1111111111111111111111111111111111111111 and CA: So11111111111111111111111111111111111111112";
        let matches = resolve(&PatternRegistry::standard(), text);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].network, NetworkTag::Evm);
        assert_eq!(matches[0].value, "0x1111111111111111111111111111111111111111");
        assert_eq!(matches[0].start, 6);
        assert_eq!(matches[0].end, 48);
    }

    #[test]
    fn test_evm_beats_overlapping_solana() {
        let matches = resolve(&PatternRegistry::standard(), DUAL_ADDR);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].network, NetworkTag::Evm);
    }

    #[test]
    fn test_priority_follows_registration_order() {
        let sol_first = PatternRegistry::with_patterns(vec![
            AddressPattern::new(
                NetworkTag::Solana,
                r"[1-9A-HJ-NP-Za-km-z]{32,}",
                Some(LengthBounds { min: 32, max: 44 }),
                Vec::new(),
            )
            .unwrap(),
            AddressPattern::new(NetworkTag::Evm, r"0x[a-fA-F0-9]{40}", None, Vec::new()).unwrap(),
        ]);
        let matches = resolve(&sol_first, DUAL_ADDR);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].network, NetworkTag::Solana);
        assert_eq!(matches[0].value, &DUAL_ADDR[1..]);
    }

    #[test]
    fn test_multiple_networks_sorted() {
        let text = format!("sol {SOL_ADDR} then evm {EVM_ADDR}.");
        let matches = resolve(&PatternRegistry::standard(), &text);

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].network, NetworkTag::Solana);
        assert_eq!(matches[0].value, SOL_ADDR);
        assert_eq!(matches[1].network, NetworkTag::Evm);
        assert_eq!(&text[matches[1].start..matches[1].end], EVM_ADDR);
        assert_non_overlapping(&matches);
    }

    #[test]
    fn test_overlong_base58_run_rejected() {
        let text = "A".repeat(60);
        assert!(resolve(&PatternRegistry::standard(), &text).is_empty());
    }

    #[test]
    fn test_short_base58_run_rejected() {
        let text = "abcdefghijkmnopqrstuvwxyz";
        assert!(resolve(&PatternRegistry::standard(), text).is_empty());
    }

    #[test]
    fn test_ton_exact_length() {
        let ton = "3f".repeat(24);
        let matches = resolve(&PatternRegistry::standard(), &format!("ton: {ton}"));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].network, NetworkTag::Ton);

        // A 64-hex hash is not a TON address
        let hash = "3f".repeat(32);
        let matches = resolve(&PatternRegistry::standard(), &hash);
        assert!(matches.iter().all(|m| m.network != NetworkTag::Ton));
    }

    #[test]
    fn test_non_overlap_on_dense_input() {
        let text = format!("{DUAL_ADDR}{SOL_ADDR} {SOL_ADDR}{EVM_ADDR} 0x{}", "ab".repeat(30));
        let matches = resolve(&PatternRegistry::standard(), &text);
        assert!(!matches.is_empty());
        assert_non_overlapping(&matches);
        for m in &matches {
            assert_eq!(&text[m.start..m.end], m.value);
        }
    }

    #[test]
    fn test_merge_prefers_priority_over_position() {
        let earlier_low_priority = AddressMatch {
            value: "a".repeat(10),
            network: NetworkTag::Solana,
            start: 0,
            end: 10,
        };
        let later_high_priority = AddressMatch {
            value: "b".repeat(10),
            network: NetworkTag::Evm,
            start: 5,
            end: 15,
        };
        let merged = merge(vec![(2, earlier_low_priority), (0, later_high_priority.clone())]);
        assert_eq!(merged, vec![later_high_priority]);
    }
}
