//! Primary-key caches used to compute resync deltas.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::ranges;

/// KeyCache caches only primary keys.
///
/// One KeyCache exists per entity type and lives for the lifetime of the
/// [`Stream`](crate::Stream); it is never reset on reconnect. The id set and
/// `maxseq` high-water mark are just enough state for the stream to
/// resubscribe with an accurate `since`/`known` cursor, so the server only
/// transmits the true delta after a reconnect.
///
/// Known limitation: `maxseq` can be stale if a caller subscribes,
/// unsubscribes, then resubscribes to the same id before any server update
/// arrives. The high-water mark may then exceed what the narrowed
/// subscription actually observed, and an update that landed between the two
/// subscriptions can be skipped.
#[derive(Debug, Default)]
pub struct KeyCache {
    keys: BTreeSet<i64>,
    maxseq: u64,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` exists, observed at sequence `seq`.
    ///
    /// Idempotent; `maxseq` only ever moves forward.
    pub fn upsert(&mut self, id: i64, seq: u64) {
        self.keys.insert(id);
        self.maxseq = self.maxseq.max(seq);
    }

    /// Forget a single id. No-op if the id is unknown. Never lowers `maxseq`.
    pub fn delete_one(&mut self, id: i64) {
        self.keys.remove(&id);
    }

    /// Apply a range-encoded deletion notice. The empty string is a no-op.
    pub fn delete_msg(&mut self, deleted: &str) -> Result<()> {
        for id in ranges::decode(deleted)? {
            self.delete_one(id);
        }
        Ok(())
    }

    /// Serialize the current id set in range form, e.g. `"1-3,5-6,9"`.
    ///
    /// Sent to the peer so it can compute which ids must be deleted without
    /// resending unchanged payloads. Empty cache encodes to `""`.
    pub fn known(&self) -> String {
        ranges::encode(self.keys.iter().copied())
    }

    /// Highest sequence number ever folded into this cache.
    pub fn maxseq(&self) -> u64 {
        self.maxseq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_known() {
        let mut cache = KeyCache::new();
        cache.upsert(5, 10);
        assert_eq!(cache.known(), "5");
        assert_eq!(cache.maxseq(), 10);

        cache.upsert(6, 11);
        assert_eq!(cache.known(), "5,6");

        cache.delete_one(5);
        assert_eq!(cache.known(), "6");
    }

    #[test]
    fn test_maxseq_monotonic() {
        let mut cache = KeyCache::new();
        cache.upsert(1, 100);
        cache.upsert(2, 50);
        assert_eq!(cache.maxseq(), 100);

        // deletes never lower the high-water mark
        cache.delete_one(1);
        cache.delete_one(2);
        assert_eq!(cache.maxseq(), 100);
        assert_eq!(cache.known(), "");
    }

    #[test]
    fn test_upsert_idempotent() {
        let mut cache = KeyCache::new();
        cache.upsert(3, 7);
        cache.upsert(3, 7);
        assert_eq!(cache.known(), "3");
        assert_eq!(cache.maxseq(), 7);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut cache = KeyCache::new();
        cache.upsert(1, 1);
        cache.delete_one(42);
        assert_eq!(cache.known(), "1");
    }

    #[test]
    fn test_delete_msg() {
        let mut cache = KeyCache::new();
        for id in [1, 2, 3, 5, 6, 9] {
            cache.upsert(id, id as u64);
        }
        assert_eq!(cache.known(), "1-3,5-6,9");

        cache.delete_msg("2-3,9").unwrap();
        assert_eq!(cache.known(), "1,5-6");

        // empty notice is a no-op
        cache.delete_msg("").unwrap();
        assert_eq!(cache.known(), "1,5-6");
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_known_roundtrip(
            upserts in proptest::collection::vec((0i64..1000, 0u64..1000), 0..100),
            deletes in proptest::collection::vec(0i64..1000, 0..50),
        ) {
            let mut cache = KeyCache::new();
            let mut expected = BTreeSet::new();
            for (id, seq) in upserts {
                cache.upsert(id, seq);
                expected.insert(id);
            }
            for id in deletes {
                cache.delete_one(id);
                expected.remove(&id);
            }
            let decoded: BTreeSet<i64> =
                crate::ranges::decode(&cache.known()).unwrap().into_iter().collect();
            prop_assert_eq!(decoded, expected);
        }
    }
}
