//! AdaptivePow algorithm parameters
//!
//! Epoch arithmetic and dataset geometry. The DAG starts at 1 GB and doubles
//! every `GROWTH_RATE` epochs, capped at ten doublings (~1 TB).

use crate::types::Epoch;
use crate::{Error, Result};

/// Epoch length in seconds (180 days)
pub const EPOCH_LENGTH: u64 = 180 * 24 * 60 * 60;

/// DAG size at epoch 0 (1 GB)
pub const DAG_BASE_SIZE: u64 = 1 << 30;

/// Epochs per DAG doubling
pub const GROWTH_RATE: u32 = 4;

/// Maximum number of DAG doublings
pub const MAX_DOUBLINGS: u32 = 10;

/// Bytes per dataset item
pub const HASH_BYTES: u64 = 64;

/// 32-bit words per dataset item
pub const ITEM_WORDS: usize = 16;

/// Cache size is `dag_size / CACHE_RATIO`
pub const CACHE_RATIO: u64 = 64;

/// Parent-mixing rounds per DAG item
pub const DAG_PARENT_ROUNDS: u32 = 256;

/// Words in the per-nonce mix state
pub const MIX_WORDS: usize = 64;

/// DAG loads per nonce
pub const DAG_LOADS: usize = 64;

/// Random math operations per DAG load
pub const MATH_OPS: usize = 16;

/// Work items per search dispatch
pub const BATCH_SIZE: u64 = 1 << 21;

/// Result slots per search dispatch
pub const MAX_BATCH_RESULTS: usize = 16;

/// DAG items per generation sub-dispatch (watchdog chunking)
pub const DAG_CHUNK_ITEMS: u64 = 1 << 20;

/// Compute the epoch for a timestamp, relative to the chain genesis.
pub fn epoch_at(timestamp: u64, genesis_time: u64) -> Epoch {
    if timestamp <= genesis_time {
        return Epoch::new(0);
    }
    Epoch::new(((timestamp - genesis_time) / EPOCH_LENGTH) as u32)
}

/// DAG size in bytes for an epoch, using the production base size.
pub fn dag_size(epoch: Epoch) -> u64 {
    dag_size_with(epoch, DAG_BASE_SIZE, GROWTH_RATE)
}

/// DAG size in bytes for an epoch with an explicit base size and growth rate.
pub fn dag_size_with(epoch: Epoch, base_size: u64, growth_rate: u32) -> u64 {
    let doublings = (epoch.value() / growth_rate).min(MAX_DOUBLINGS);
    base_size << doublings
}

/// Cache size in bytes for an epoch, using the production base size.
pub fn cache_size(epoch: Epoch) -> u64 {
    dag_size(epoch) / CACHE_RATIO
}

/// Dataset geometry for one epoch: byte sizes and item counts for the cache
/// and the DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub dag_bytes: u64,
    pub cache_bytes: u64,
    pub n_dag: u64,
    pub n_cache: u64,
}

impl Geometry {
    /// Geometry for an epoch at production sizes
    pub fn for_epoch(epoch: Epoch) -> Self {
        let dag_bytes = dag_size(epoch);
        let cache_bytes = dag_bytes / CACHE_RATIO;
        Self {
            dag_bytes,
            cache_bytes,
            n_dag: dag_bytes / HASH_BYTES,
            n_cache: cache_bytes / HASH_BYTES,
        }
    }

    /// Geometry from an explicit DAG byte size.
    ///
    /// The size must be a positive multiple of `HASH_BYTES * CACHE_RATIO`
    /// (4096) so that both the DAG and the derived cache stay whole numbers
    /// of 64-byte items.
    pub fn from_dag_size(dag_bytes: u64) -> Result<Self> {
        if dag_bytes == 0 || dag_bytes % (HASH_BYTES * CACHE_RATIO) != 0 {
            return Err(Error::config(format!(
                "DAG size must be a positive multiple of {} bytes, got {}",
                HASH_BYTES * CACHE_RATIO,
                dag_bytes
            )));
        }
        let cache_bytes = dag_bytes / CACHE_RATIO;
        Ok(Self {
            dag_bytes,
            cache_bytes,
            n_dag: dag_bytes / HASH_BYTES,
            n_cache: cache_bytes / HASH_BYTES,
        })
    }
}
