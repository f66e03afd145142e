//! Merging a freshly collected set into the persisted active set.

use crate::types::{Indicator, IndicatorSet, MAX_SCORE};

/// Merge `fresh` sightings into the `existing` active set.
///
/// - Keys only in `fresh` are inserted unchanged.
/// - Keys in both: sources become the deduplicated union, the score becomes
///   `min(100, (existing + fresh) / 2)`, `last_seen`/`expires_at` take the
///   fresh values, and `first_seen` and the type are kept from `existing`.
/// - Keys only in `existing` pass through unchanged.
///
/// The averaging step deliberately dampens scores toward recent-weight
/// scale instead of accumulating them without bound, which also means the
/// merge is not associative across repeated cycles. That behavior is the
/// contract, not an accident.
#[must_use]
pub fn merge(mut existing: IndicatorSet, fresh: IndicatorSet) -> IndicatorSet {
    let mut merged = IndicatorSet::new();

    for (key, new) in fresh.into_pairs() {
        match existing.remove(&key) {
            None => {
                merged.insert(new);
            }
            Some(old) => {
                merged.insert(combine(old, new));
            }
        }
    }

    for (_, old) in existing.into_pairs() {
        merged.insert(old);
    }

    merged
}

fn combine(old: Indicator, new: Indicator) -> Indicator {
    let mut sources = old.sources;
    for s in new.sources {
        if !sources.contains(&s) {
            sources.push(s);
        }
    }

    Indicator {
        value: old.value,
        // The type is derived from the value and immutable once set.
        indicator_type: old.indicator_type,
        score: ((old.score + new.score) / 2.0).min(MAX_SCORE),
        sources,
        first_seen: old.first_seen,
        last_seen: new.last_seen,
        expires_at: new.expires_at,
    }
}
