//! Epoch dataset pipeline
//!
//! The cache is a small, strictly sequential chain of Keccak-f[800] outputs
//! derived from the epoch seed. The DAG is the large dataset materialized
//! from the cache, one independent item per index. Both are bitwise
//! deterministic for a given epoch.

use crate::crypto::{fnv1a, keccak_f800};
use crate::params::{DAG_PARENT_ROUNDS, HASH_BYTES, ITEM_WORDS};
use crate::types::Seed;
use crate::{Error, Result};
use rayon::prelude::*;
use tracing::debug;

/// One 64-byte dataset item viewed as 16 little-endian words
pub type DagItem = [u32; ITEM_WORDS];

/// Read access to DAG items, either resident or recomputed on demand
pub trait DagSource: Sync {
    /// Number of items in the DAG
    fn item_count(&self) -> u64;

    /// Fetch one item by index; `index` must be below `item_count`
    fn item(&self, index: u64) -> DagItem;
}

/// The seed-derived cache the DAG is built from.
///
/// Owned by the dataset builder during DAG generation; the verifier keeps its
/// own copy to materialize items on demand.
pub struct Cache {
    words: Vec<u32>,
    n_items: u64,
}

impl Cache {
    /// Generate the cache for a seed.
    ///
    /// Item 0 is the seed block (seed words followed by their complements);
    /// every later item is the Keccak-f[800] image of its predecessor.
    pub fn generate(seed: &Seed, n_items: u64) -> Result<Self> {
        let word_count = n_items as usize * ITEM_WORDS;
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| Error::out_of_memory(n_items * HASH_BYTES))?;

        let seed_words = seed.words();
        let mut block = [0u32; ITEM_WORDS];
        block[..8].copy_from_slice(&seed_words);
        for k in 0..8 {
            block[8 + k] = seed_words[k] ^ 0xFFFF_FFFF;
        }

        for _ in 0..n_items {
            let mut state = [0u32; 25];
            state[..ITEM_WORDS].copy_from_slice(&block);
            keccak_f800(&mut state);
            block.copy_from_slice(&state[..ITEM_WORDS]);
            words.extend_from_slice(&block);
        }

        Ok(Self { words, n_items })
    }

    /// Number of cache items
    pub fn item_count(&self) -> u64 {
        self.n_items
    }

    /// Cache size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.n_items * HASH_BYTES
    }

    /// The 16 words of one cache item
    #[inline(always)]
    pub fn item_words(&self, index: u64) -> &[u32] {
        let start = index as usize * ITEM_WORDS;
        &self.words[start..start + ITEM_WORDS]
    }
}

/// Compute a single DAG item from the cache.
///
/// 256 parent rounds of FNV1a mixing against cache items selected by the
/// evolving first mix word. Shared by the resident builder and the
/// light (on-demand) path, so both produce identical bytes.
pub fn compute_dag_item(cache: &Cache, index: u64) -> DagItem {
    let n_cache = cache.item_count();
    let mut mix = [0u32; ITEM_WORDS];
    mix.copy_from_slice(cache.item_words(index % n_cache));
    mix[0] ^= index as u32;

    for round in 0..DAG_PARENT_ROUNDS {
        let parent = fnv1a(index as u32 ^ round, mix[0]) as u64 % n_cache;
        let parent_words = cache.item_words(parent);
        for k in 0..ITEM_WORDS {
            mix[k] = fnv1a(mix[k], parent_words[k]);
        }
    }

    mix
}

/// The fully resident DAG for one epoch.
///
/// Built once per epoch, then read-only for every search until the epoch
/// changes.
pub struct Dag {
    words: Vec<u32>,
    n_items: u64,
}

impl Dag {
    /// Generate the full DAG from a cache.
    ///
    /// Items are independent and generated in parallel, in chunks of
    /// `chunk_items` sub-dispatches so progress stays observable and a GPU
    /// port can stay under watchdog limits.
    pub fn generate(cache: &Cache, n_items: u64, chunk_items: u64) -> Result<Self> {
        let word_count = n_items as usize * ITEM_WORDS;
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| Error::out_of_memory(n_items * HASH_BYTES))?;
        words.resize(word_count, 0u32);

        let chunk_items = chunk_items.max(1);
        let mut chunk_index = 0u64;
        let mut offset = 0u64;
        while offset < n_items {
            let end = (offset + chunk_items).min(n_items);
            let span = &mut words[offset as usize * ITEM_WORDS..end as usize * ITEM_WORDS];

            span.par_chunks_mut(ITEM_WORDS)
                .enumerate()
                .for_each(|(local, out)| {
                    let item = compute_dag_item(cache, offset + local as u64);
                    out.copy_from_slice(&item);
                });

            if chunk_index % 10 == 0 {
                debug!(
                    "DAG progress: {:.1}%",
                    100.0 * offset as f64 / n_items as f64
                );
            }
            chunk_index += 1;
            offset = end;
        }

        Ok(Self { words, n_items })
    }

    /// DAG size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.n_items * HASH_BYTES
    }
}

impl DagSource for Dag {
    fn item_count(&self) -> u64 {
        self.n_items
    }

    #[inline(always)]
    fn item(&self, index: u64) -> DagItem {
        let start = index as usize * ITEM_WORDS;
        let mut item = [0u32; ITEM_WORDS];
        item.copy_from_slice(&self.words[start..start + ITEM_WORDS]);
        item
    }
}

/// A cache-backed DAG view that materializes items on demand.
///
/// Each access costs the 256 parent rounds; this is what the verifier uses
/// so it never needs the multi-gigabyte dataset.
pub struct LightDag {
    cache: Cache,
    n_dag: u64,
}

impl LightDag {
    /// Create a light view over a cache
    pub fn new(cache: Cache, n_dag: u64) -> Self {
        Self { cache, n_dag }
    }

    /// The backing cache
    pub fn cache(&self) -> &Cache {
        &self.cache
    }
}

impl DagSource for LightDag {
    fn item_count(&self) -> u64 {
        self.n_dag
    }

    fn item(&self, index: u64) -> DagItem {
        compute_dag_item(&self.cache, index)
    }
}
