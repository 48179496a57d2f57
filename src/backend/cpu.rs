//! CPU reference backend
//!
//! Runs the three logical kernels (cache generation, DAG generation, and
//! batch search) on a thread pool. This is the coequal implementation the
//! GPU dispatch layers are checked against: same inputs, same bytes, same
//! found nonces.

use super::{BackendKind, DeviceInfo, PowBackend, SearchBatch};
use crate::dataset::{Cache, Dag};
use crate::hash::hash_candidate;
use crate::params::{Geometry, MAX_BATCH_RESULTS};
use crate::types::{Epoch, Header, Nonce, Seed, Target};
use crate::utils::format_bytes;
use crate::{Error, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Reference backend executing kernels on host threads
pub struct CpuBackend {
    device: DeviceInfo,
    pool: rayon::ThreadPool,
    dag: Option<Dag>,
}

impl CpuBackend {
    /// Create a backend with the given worker thread count (0 = all cores)
    pub fn new(threads: usize) -> Result<Self> {
        let threads = if threads == 0 {
            num_cpus::get()
        } else {
            threads
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pow-cpu-{}", i))
            .build()
            .map_err(|e| Error::device_init(format!("thread pool creation failed: {}", e)))?;

        info!("created CPU reference backend with {} threads", threads);

        Ok(Self {
            device: DeviceInfo {
                id: 0,
                name: "cpu-reference".to_string(),
                memory_bytes: 0,
                free_bytes: 0,
                compute_units: threads as u32,
                available: true,
            },
            pool,
            dag: None,
        })
    }
}

impl PowBackend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::CpuReference
    }

    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn dataset_ready(&self) -> bool {
        self.dag.is_some()
    }

    fn generate_dag(
        &mut self,
        epoch: Epoch,
        seed: &Seed,
        geometry: Geometry,
        chunk_items: u64,
    ) -> Result<()> {
        let started = Instant::now();
        info!(
            epoch = epoch.value(),
            dag_size = %format_bytes(geometry.dag_bytes),
            n_dag = geometry.n_dag,
            "generating dataset"
        );

        // the cache is ephemeral: handed to the DAG builder read-only,
        // dropped as soon as the DAG is complete
        let cache = Cache::generate(seed, geometry.n_cache)?;
        debug!(cache_bytes = cache.size_bytes(), "cache complete");

        let dag = self
            .pool
            .install(|| Dag::generate(&cache, geometry.n_dag, chunk_items))?;

        info!(
            elapsed_secs = started.elapsed().as_secs(),
            "dataset generation complete"
        );
        self.dag = Some(dag);
        Ok(())
    }

    fn search(
        &self,
        header: &Header,
        target: Target,
        start_nonce: Nonce,
        batch_size: u64,
    ) -> Result<SearchBatch> {
        let dag = self.dag.as_ref().ok_or(Error::DatasetNotReady)?;

        // GPU-shaped result collection: an atomic counter indexes a bounded
        // slot array, and hits past the cap are dropped. The cap is a
        // sampling bound; expected hits per batch are far below it.
        let hit_count = AtomicU32::new(0);
        let slots: [AtomicU64; MAX_BATCH_RESULTS] =
            std::array::from_fn(|_| AtomicU64::new(0));

        self.pool.install(|| {
            (0..batch_size).into_par_iter().for_each(|offset| {
                let nonce = Nonce::new(start_nonce.value().wrapping_add(offset));
                let candidate = hash_candidate(header, nonce, dag);
                if target.met_by(candidate) {
                    let slot = hit_count.fetch_add(1, Ordering::Relaxed) as usize;
                    if slot < MAX_BATCH_RESULTS {
                        slots[slot].store(nonce.value(), Ordering::Relaxed);
                    }
                }
            });
        });

        let hits = hit_count.load(Ordering::Relaxed);
        let kept = (hits as usize).min(MAX_BATCH_RESULTS);
        let mut nonces: Vec<Nonce> = slots[..kept]
            .iter()
            .map(|slot| Nonce::new(slot.load(Ordering::Relaxed)))
            .collect();
        nonces.sort_unstable();

        debug!(
            start_nonce = %start_nonce,
            batch_size,
            hits,
            "search batch complete"
        );

        Ok(SearchBatch {
            nonces,
            hashes: batch_size,
            dropped: hits - kept as u32,
        })
    }

    fn cleanup(&mut self) -> Result<()> {
        self.dag = None;
        Ok(())
    }
}
