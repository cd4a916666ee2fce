//! Unordered-pair deduplication
//!
//! Edge and route discovery visits every qualifying pair twice, once from each
//! endpoint's range query. Canonicalizing the pair into one order-independent
//! key and tracking keys in a concurrent set guarantees each unordered pair is
//! emitted at most once, in both the sequential and the parallel code paths.

use dashmap::DashSet;

/// Separator between the two names in a pair key. The ASCII unit separator is
/// a control character that never occurs in star names.
const PAIR_KEY_SEPARATOR: char = '\u{1f}';

/// Canonical order-independent key for an unordered pair of names.
///
/// `canonical_pair_key(a, b) == canonical_pair_key(b, a)` for all inputs, and
/// distinct unordered pairs always map to distinct keys.
pub fn canonical_pair_key(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut key = String::with_capacity(first.len() + second.len() + PAIR_KEY_SEPARATOR.len_utf8());
    key.push_str(first);
    key.push(PAIR_KEY_SEPARATOR);
    key.push_str(second);
    key
}

/// Thread-safe set of already-processed unordered pairs.
///
/// Scoped to a single graph/transit run: created empty, grows monotonically,
/// discarded with the run. Workers on the parallel path share one instance;
/// the atomic check-and-set in [`try_mark`](Self::try_mark) decides which
/// worker emits a given pair.
#[derive(Debug, Default)]
pub struct SeenPairs {
    keys: DashSet<String>,
}

impl SeenPairs {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically mark the unordered pair `(a, b)` as processed.
    ///
    /// Returns true iff the pair had not been marked before, i.e. the caller
    /// won the right to emit it. A single insert, not contains-then-insert,
    /// so the guarantee holds under concurrent access.
    pub fn try_mark(&self, a: &str, b: &str) -> bool {
        self.keys.insert(canonical_pair_key(a, b))
    }

    /// Number of distinct pairs marked so far.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no pair has been marked yet.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
