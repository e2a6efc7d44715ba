use std::collections::HashMap;

use async_trait::async_trait;
use bitcoin::Txid;
use parking_lot::RwLock;

use crate::types::ColoredOutput;

/// Abstraction over the coloring result store used by `ColoringEngine`.
///
/// Any backend that can read and write colored outputs keyed by outpoint
/// can be used. The engine treats entries as write-once: a second `put`
/// for the same outpoint must be dropped or hold an equal value.
/// Implementations intended for concurrent use should coalesce lookups of
/// the same outpoint into a single computation; the in-memory reference
/// implementations here do not.
#[async_trait]
pub trait OutputCache: Send + Sync {
    /// Fetches the cached colored output for an outpoint, if present.
    async fn get(&self, txid: &Txid, vout: u32) -> Option<ColoredOutput>;

    /// Saves the colored output for an outpoint.
    async fn put(&self, txid: Txid, vout: u32, output: ColoredOutput);
}

/// Cache that never retains anything.
///
/// Every `get` misses and every `put` is discarded. Useful as the identity
/// element when memoization is not wanted, e.g. in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl OutputCache for NoopCache {
    async fn get(&self, _txid: &Txid, _vout: u32) -> Option<ColoredOutput> {
        None
    }

    async fn put(&self, _txid: Txid, _vout: u32, _output: ColoredOutput) {}
}

/// Unbounded in-memory cache keyed by outpoint.
///
/// Entries are write-once: a `put` for an already-present outpoint is
/// dropped.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<(Txid, u32), ColoredOutput>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of cached outpoints.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl OutputCache for MemoryCache {
    async fn get(&self, txid: &Txid, vout: u32) -> Option<ColoredOutput> {
        self.entries.read().get(&(*txid, vout)).cloned()
    }

    async fn put(&self, txid: Txid, vout: u32, output: ColoredOutput) {
        self.entries.write().entry((txid, vout)).or_insert(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::{Amount, ScriptBuf, TxOut};

    fn txid(byte: u8) -> Txid {
        Txid::from_slice(&[byte; 32]).expect("valid txid bytes")
    }

    fn output(value: u64) -> ColoredOutput {
        ColoredOutput::uncolored(&TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::new(),
        })
    }

    #[tokio::test]
    async fn noop_cache_retains_nothing() {
        let cache = NoopCache;
        cache.put(txid(1), 0, output(100)).await;
        assert_eq!(cache.get(&txid(1), 0).await, None);
    }

    #[tokio::test]
    async fn memory_cache_round_trips_by_outpoint() {
        let cache = MemoryCache::new();
        cache.put(txid(1), 0, output(100)).await;
        cache.put(txid(1), 1, output(200)).await;

        assert_eq!(cache.get(&txid(1), 0).await, Some(output(100)));
        assert_eq!(cache.get(&txid(1), 1).await, Some(output(200)));
        assert_eq!(cache.get(&txid(2), 0).await, None);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn memory_cache_is_write_once() {
        let cache = MemoryCache::new();
        cache.put(txid(1), 0, output(100)).await;
        cache.put(txid(1), 0, output(999)).await;

        assert_eq!(cache.get(&txid(1), 0).await, Some(output(100)));
    }
}
