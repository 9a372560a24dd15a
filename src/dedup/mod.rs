//! Fuzzy-name deduplication of facility records
//!
//! Source payloads regularly overlap: the same garage appears twice with
//! slightly different spellings ("Parkhaus Schützenstraße" vs
//! "Parkhaus Schuetzenstrasse"). This module merges such records by
//! normalized-name similarity:
//! - Names are lowercased, German umlauts transliterated, whitespace collapsed
//! - Similarity is Levenshtein distance normalized by the longer name
//! - Above-threshold pairs are clustered transitively; each cluster keeps
//!   exactly one survivor
//!
//! The survivor is the record with the larger reported capacity; on equal
//! capacity the higher-priority source wins.

use regex::Regex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::models::RawRecord;

// ============================================================================
// Configuration
// ============================================================================

/// Deduplication configuration
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Minimum similarity for two names to count as the same facility (0.0 - 1.0)
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
        }
    }
}

// ============================================================================
// Text normalization
// ============================================================================

/// Normalize a facility name for comparison
///
/// Lowercases, transliterates German umlauts (ä -> ae, ö -> oe, ü -> ue,
/// ß -> ss) and collapses runs of whitespace into single spaces.
pub fn normalize_name(name: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    let mut folded = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        match c {
            'ä' => folded.push_str("ae"),
            'ö' => folded.push_str("oe"),
            'ü' => folded.push_str("ue"),
            'ß' => folded.push_str("ss"),
            c => folded.push(c),
        }
    }

    re.replace_all(folded.trim(), " ").to_string()
}

/// Similarity of two strings in 0.0 - 1.0
///
/// Levenshtein distance normalized by the character count of the longer
/// string. Callers are expected to pass already-normalized names.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longer = a.chars().count().max(b.chars().count());
    if longer == 0 {
        return 1.0;
    }

    1.0 - levenshtein(a, b) as f64 / longer as f64
}

/// Levenshtein edit distance over characters, two-row dynamic programming
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

// ============================================================================
// Deduplicator
// ============================================================================

/// Merges near-duplicate facility records from overlapping payloads
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    /// Create a deduplicator with the default threshold
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a deduplicator with a custom configuration
    pub fn with_config(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Merge duplicate records, preserving first-seen order of survivors
    ///
    /// Similar pairs are clustered transitively before survivors are elected:
    /// a spelling that bridges two variants pulls both into one cluster even
    /// when the variants score below the threshold against each other. One
    /// record survives per cluster, so any two survivors score below the
    /// threshold and running the pass on its own output changes nothing.
    pub fn merge(&self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        let keys: Vec<String> = records.iter().map(|r| normalize_name(&r.name)).collect();

        // Union every above-threshold pair so similarity chains land in
        // one cluster
        let mut parent: Vec<usize> = (0..records.len()).collect();
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                if similarity(&keys[i], &keys[j]) >= self.config.similarity_threshold {
                    union(&mut parent, i, j);
                }
            }
        }

        // Elect the preferred record of every cluster, first-seen cluster first
        let mut elected: HashMap<usize, usize> = HashMap::new();
        let mut order: Vec<usize> = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            let root = find(&mut parent, idx);
            match elected.entry(root) {
                Entry::Occupied(mut slot) => {
                    let incumbent = *slot.get();
                    if prefer(record, &records[incumbent]) {
                        tracing::debug!(
                            kept = %record.name,
                            dropped = %records[incumbent].name,
                            "Merged duplicate facility records"
                        );
                        slot.insert(idx);
                    } else {
                        tracing::debug!(
                            kept = %records[incumbent].name,
                            dropped = %record.name,
                            "Merged duplicate facility records"
                        );
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(idx);
                    order.push(root);
                }
            }
        }

        let mut slots: Vec<Option<RawRecord>> = records.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|root| elected.get(&root).and_then(|&idx| slots[idx].take()))
            .collect()
    }
}

/// Whether `candidate` should replace `incumbent` as the surviving record
fn prefer(candidate: &RawRecord, incumbent: &RawRecord) -> bool {
    if candidate.capacity != incumbent.capacity {
        return candidate.capacity > incumbent.capacity;
    }

    candidate.source.priority() > incumbent.source.priority()
}

/// Find the cluster root of `i`, compressing the path on the way
fn find(parent: &mut [usize], i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }

    let mut node = i;
    while parent[node] != root {
        let next = parent[node];
        parent[node] = root;
        node = next;
    }

    root
}

/// Join the clusters of `a` and `b`, keeping the earliest index as root
fn union(parent: &mut [usize], a: usize, b: usize) {
    let root_a = find(parent, a);
    let root_b = find(parent, b);
    if root_a != root_b {
        parent[root_a.max(root_b)] = root_a.min(root_b);
    }
}
