//! Compute backends
//!
//! The miner core depends on a small capability set (build the dataset, run
//! a search batch, release resources) rather than on any particular GPU
//! runtime.
//! The CPU reference backend implements the same three kernels a GPU port
//! exposes, so every backend is checked against the same contract.

use crate::config::MinerConfig;
use crate::params::Geometry;
use crate::types::{Epoch, Header, Nonce, Seed, Target};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod cpu;

pub use cpu::CpuBackend;

/// Which compute runtime a backend drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// NVIDIA CUDA dispatch layer
    Cuda,
    /// OpenCL dispatch layer
    OpenCl,
    /// In-process reference implementation
    CpuReference,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cuda => write!(f, "cuda"),
            BackendKind::OpenCl => write!(f, "opencl"),
            BackendKind::CpuReference => write!(f, "cpu-reference"),
        }
    }
}

/// One enumerated compute device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device id used for selection
    pub id: u32,
    /// Human-readable device name
    pub name: String,
    /// Total device memory in bytes
    pub memory_bytes: u64,
    /// Free device memory in bytes
    pub free_bytes: u64,
    /// Compute units (multiprocessors, or worker threads for the CPU)
    pub compute_units: u32,
    /// Whether the device can be used
    pub available: bool,
}

/// Create the backend for a configuration.
///
/// The CUDA and OpenCL dispatch layers are linked in by the embedding
/// application; a build without them can only offer the reference backend.
pub fn create_backend(kind: BackendKind, config: &MinerConfig) -> Result<Box<dyn PowBackend>> {
    match kind {
        BackendKind::CpuReference => Ok(Box::new(CpuBackend::new(config.threads)?)),
        BackendKind::Cuda | BackendKind::OpenCl => Err(Error::device_init(format!(
            "built without {} support",
            kind
        ))),
    }
}

/// Select a device by id from an enumeration
pub fn select_device(devices: &[DeviceInfo], id: u32) -> Result<&DeviceInfo> {
    let device = devices
        .iter()
        .find(|d| d.id == id)
        .ok_or(Error::NoSuchDevice { device: id })?;
    if !device.available {
        return Err(Error::device_init(format!(
            "device {} ({}) is not available",
            device.id, device.name
        )));
    }
    Ok(device)
}

/// Outcome of one search dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchBatch {
    /// Nonces that met the target, at most the result-slot cap, ascending
    pub nonces: Vec<Nonce>,
    /// Work items attempted in this dispatch
    pub hashes: u64,
    /// Hits that arrived after the result slots were full
    pub dropped: u32,
}

/// The capability set the miner core needs from a compute runtime.
///
/// One instance owns one device context: its dataset residency and kernel
/// state. The search path takes `&self`: the DAG is read-only once built
/// and may serve concurrent dispatches.
pub trait PowBackend: Send {
    /// Which runtime this backend drives
    fn kind(&self) -> BackendKind;

    /// The device this context is bound to
    fn device(&self) -> &DeviceInfo;

    /// Whether a dataset is resident and searches may run
    fn dataset_ready(&self) -> bool;

    /// Build the cache and DAG for an epoch seed, replacing any resident
    /// dataset. `chunk_items` bounds each generation sub-dispatch.
    fn generate_dag(
        &mut self,
        epoch: Epoch,
        seed: &Seed,
        geometry: Geometry,
        chunk_items: u64,
    ) -> Result<()>;

    /// Run one batch of `batch_size` work items starting at `start_nonce`.
    fn search(
        &self,
        header: &Header,
        target: Target,
        start_nonce: Nonce,
        batch_size: u64,
    ) -> Result<SearchBatch>;

    /// Release the dataset and any kernel state. The context may generate a
    /// new dataset afterwards.
    fn cleanup(&mut self) -> Result<()>;
}
