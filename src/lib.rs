//! AdaptivePow Miner Core
//!
//! The hash kernel and dataset pipeline of the AdaptivePow proof-of-work
//! algorithm:
//! - Epoch-keyed dataset generation (seed → cache → DAG)
//! - The per-nonce mix-search kernel (Keccak-f[800], FNV1a, KISS99, random ops)
//! - A batch search driver with hash-rate accounting and safe result collection
//! - A CPU verifier that re-checks any found nonce deterministically
//!
//! Pool networking, job parsing, and the CLI live outside this crate; the GPU
//! dispatch layer is consumed through the [`backend::PowBackend`] capability.

pub mod backend;
pub mod config;
pub mod crypto;
pub mod dataset;
pub mod error;
pub mod hash;
pub mod miner;
pub mod params;
pub mod types;
pub mod utils;
pub mod verify;

pub use backend::{
    create_backend, BackendKind, CpuBackend, DeviceInfo, PowBackend, SearchBatch,
};
pub use config::MinerConfig;
pub use error::{Error, Result};
pub use miner::{Miner, MinerState, SearchReport};
pub use types::*;
pub use verify::Verifier;

/// Application information
pub const APP_NAME: &str = "adaptivepow-miner";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
