//! Configuration for the miner core
//!
//! Runtime knobs for one device context, loadable from YAML with proper
//! validation and defaults. The CLI that fills this in lives outside the
//! core.

use crate::params::{self, Geometry};
use crate::types::Epoch;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for one miner device context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinerConfig {
    /// Device id to select from the enumerated GPU list
    pub device: u32,

    /// Worker threads for the CPU reference backend (0 = all cores)
    pub threads: usize,

    /// Chain genesis timestamp in seconds
    pub genesis_time: u64,

    /// Work items per search dispatch
    pub batch_size: u64,

    /// DAG items per generation sub-dispatch
    pub dag_chunk_items: u64,

    /// DAG size at epoch 0; reduced values are for tests and capacity checks
    pub dag_base_size: u64,

    /// Epochs per DAG doubling
    pub growth_rate: u32,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            device: 0,
            threads: 0,
            genesis_time: 0,
            batch_size: params::BATCH_SIZE,
            dag_chunk_items: params::DAG_CHUNK_ITEMS,
            dag_base_size: params::DAG_BASE_SIZE,
            growth_rate: params::GROWTH_RATE,
        }
    }
}

impl MinerConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be positive"));
        }
        if self.dag_chunk_items == 0 {
            return Err(Error::config("dag_chunk_items must be positive"));
        }
        if self.growth_rate == 0 {
            return Err(Error::config("growth_rate must be positive"));
        }
        if self.dag_base_size == 0
            || self.dag_base_size % (params::HASH_BYTES * params::CACHE_RATIO) != 0
        {
            return Err(Error::config(format!(
                "dag_base_size must be a positive multiple of {}",
                params::HASH_BYTES * params::CACHE_RATIO
            )));
        }
        Ok(())
    }

    /// Epoch for a timestamp under this configuration's genesis
    pub fn epoch_at(&self, timestamp: u64) -> Epoch {
        params::epoch_at(timestamp, self.genesis_time)
    }

    /// Dataset geometry for an epoch under this configuration's sizes
    pub fn geometry(&self, epoch: Epoch) -> Result<Geometry> {
        Geometry::from_dag_size(params::dag_size_with(
            epoch,
            self.dag_base_size,
            self.growth_rate,
        ))
    }
}
