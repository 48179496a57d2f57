//! Miner device context and batch driver
//!
//! One `Miner` owns one device context: its backend, dataset lifecycle,
//! nonce cursor, and statistics. The host control path is single-threaded
//! per context; batches block until the backend completes them, and
//! cancellation is cooperative at batch boundaries.

use crate::backend::{DeviceInfo, PowBackend};
use crate::config::MinerConfig;
use crate::params::Geometry;
use crate::types::{Epoch, Header, MiningJob, MiningResult, MinerStats, Nonce, Seed};
use crate::verify::Verifier;
use crate::{Error, Result};
use std::fmt;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Span};

/// Lifecycle of one device context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    /// No dataset; nothing can run
    Uninit,
    /// A dataset (re)build is pending or in progress
    DagGenerating,
    /// Dataset resident; jobs may be submitted
    Ready,
    /// A batch is in flight
    Searching,
    /// Context has been torn down
    Shutdown,
}

impl fmt::Display for MinerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinerState::Uninit => write!(f, "uninit"),
            MinerState::DagGenerating => write!(f, "dag-generating"),
            MinerState::Ready => write!(f, "ready"),
            MinerState::Searching => write!(f, "searching"),
            MinerState::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Outcome of one submitted batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReport {
    /// Verified solutions found in this batch
    pub results: Vec<MiningResult>,
    /// First nonce probed by this batch
    pub start_nonce: Nonce,
    /// Work items attempted
    pub hashes: u64,
}

/// Create a tracing span for mining operations
pub fn mining_span(job_id: &str, epoch: Epoch) -> Span {
    tracing::info_span!("mining", job_id = %job_id, epoch = epoch.value())
}

/// A mining device context
pub struct Miner {
    config: MinerConfig,
    backend: Box<dyn PowBackend>,
    verifier: Verifier,
    state: MinerState,
    epoch: Epoch,
    geometry: Option<Geometry>,
    job: Option<MiningJob>,
    current_nonce: Nonce,
    total_hashes: u64,
    accepted: u64,
    rejected: u64,
    started: Instant,
}

impl Miner {
    /// Create a context over a backend. The dataset is not built yet;
    /// call [`Miner::generate_dag`] before submitting jobs.
    pub fn new(backend: Box<dyn PowBackend>, config: MinerConfig) -> Result<Self> {
        config.validate()?;
        info!(
            device = %backend.device().name,
            backend = %backend.kind(),
            "created miner context"
        );
        Ok(Self {
            config,
            backend,
            verifier: Verifier::new(),
            state: MinerState::Uninit,
            epoch: Epoch::new(0),
            geometry: None,
            job: None,
            current_nonce: Nonce::new(0),
            total_hashes: 0,
            accepted: 0,
            rejected: 0,
            started: Instant::now(),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> MinerState {
        self.state
    }

    /// Epoch of the current (or pending) dataset
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Next nonce the batch driver will issue
    pub fn current_nonce(&self) -> Nonce {
        self.current_nonce
    }

    /// The device this context is bound to
    pub fn device(&self) -> &DeviceInfo {
        self.backend.device()
    }

    /// Build the dataset for an epoch.
    ///
    /// On failure the dataset state regresses to `Uninit`.
    pub fn generate_dag(&mut self, epoch: Epoch) -> Result<()> {
        if self.state == MinerState::Shutdown {
            return Err(Error::device_init("device context has been shut down"));
        }

        self.state = MinerState::DagGenerating;
        let geometry = self.config.geometry(epoch)?;
        let seed = Seed::derive(epoch);

        match self
            .backend
            .generate_dag(epoch, &seed, geometry, self.config.dag_chunk_items)
        {
            Ok(()) => {
                self.epoch = epoch;
                self.geometry = Some(geometry);
                self.state = MinerState::Ready;
                Ok(())
            }
            Err(e) => {
                error!(epoch = epoch.value(), error = %e, "dataset generation failed");
                self.geometry = None;
                self.state = MinerState::Uninit;
                Err(e)
            }
        }
    }

    /// Move the context to a new epoch.
    ///
    /// Transitions `Ready → DagGenerating` and drops the old dataset; jobs
    /// fail with `DatasetNotReady` until [`Miner::generate_dag`] completes
    /// for the new epoch.
    pub fn update_epoch(&mut self, epoch: Epoch) -> Result<()> {
        if self.state != MinerState::Ready {
            return Err(Error::DatasetNotReady);
        }
        if epoch == self.epoch && self.backend.dataset_ready() {
            return Ok(());
        }

        info!(old = self.epoch.value(), new = epoch.value(), "epoch change");
        self.backend.cleanup()?;
        self.verifier.invalidate();
        self.epoch = epoch;
        self.geometry = None;
        self.state = MinerState::DagGenerating;
        Ok(())
    }

    /// Run one batch of work for a job.
    ///
    /// A job id change resets the nonce cursor; within one job every batch
    /// starts where the previous one ended and no nonce is reissued. Found
    /// nonces are re-checked on the CPU before being reported; a nonce that
    /// fails verification counts as a rejected share, not an error.
    pub fn submit_job(&mut self, job: &MiningJob) -> Result<SearchReport> {
        if self.state != MinerState::Ready {
            return Err(Error::DatasetNotReady);
        }
        job.validate()?;
        let span = mining_span(&job.job_id, self.epoch);
        let _guard = span.enter();
        let geometry = self.geometry.ok_or(Error::DatasetNotReady)?;

        if self.job.as_ref().map(|j| j.job_id.as_str()) != Some(job.job_id.as_str()) {
            self.job = Some(job.clone());
            self.current_nonce = Nonce::new(0);
        }

        let header = Header::for_job(job);
        let start_nonce = self.current_nonce;

        self.state = MinerState::Searching;
        let batch = match self.backend.search(
            &header,
            job.target,
            start_nonce,
            self.config.batch_size,
        ) {
            Ok(batch) => batch,
            // a failed dispatch is not counted and tears the context down
            Err(e) => return Err(self.teardown(e)),
        };
        self.state = MinerState::Ready;

        self.current_nonce.advance(batch.hashes);
        self.total_hashes += batch.hashes;
        if batch.dropped > 0 {
            warn!(
                dropped = batch.dropped,
                "result slots overflowed; extra hits sampled away"
            );
        }

        let mut results = Vec::with_capacity(batch.nonces.len());
        for nonce in batch.nonces {
            let accepted = match self.verifier.verify_solution(job, nonce, self.epoch, geometry)
            {
                Ok(accepted) => accepted,
                Err(e) if !e.is_recoverable() => return Err(self.teardown(e)),
                Err(e) => return Err(e),
            };
            if accepted {
                self.accepted += 1;
                info!(nonce = %nonce, "share accepted");
                results.push(MiningResult {
                    job_id: job.job_id.clone(),
                    nonce,
                    found: true,
                });
            } else {
                self.rejected += 1;
                warn!(nonce = %nonce, "share rejected by verifier");
            }
        }

        Ok(SearchReport {
            results,
            start_nonce,
            hashes: batch.hashes,
        })
    }

    /// Drive batches for a job until a solution is found or the token fires.
    ///
    /// Cancellation is honored between batches; an in-flight batch always
    /// runs to completion. Returns `Ok(None)` if the nonce space is
    /// exhausted without a solution.
    pub async fn run_job(
        &mut self,
        job: MiningJob,
        cancellation: CancellationToken,
        stats_tx: Option<mpsc::UnboundedSender<MinerStats>>,
    ) -> Result<Option<MiningResult>> {
        let span = mining_span(&job.job_id, self.epoch);
        span.in_scope(|| info!("starting job"));

        loop {
            if cancellation.is_cancelled() {
                span.in_scope(|| info!("job cancelled"));
                return Err(Error::cancelled("mining job"));
            }

            // submit_job enters its own batch-scoped span
            let report = self.submit_job(&job)?;
            if let Some(tx) = &stats_tx {
                let _ = tx.send(self.stats());
            }

            // a superseded job's results carry its old id; keep only ours
            let result = report
                .results
                .into_iter()
                .find(|r| r.job_id == job.job_id);
            if let Some(result) = result {
                span.in_scope(|| info!(nonce = %result.nonce, "job solved"));
                return Ok(Some(result));
            }

            if self.current_nonce.value() < report.start_nonce.value() {
                span.in_scope(|| warn!("nonce space exhausted"));
                return Ok(None);
            }

            tokio::task::yield_now().await;
        }
    }

    /// Aggregate statistics for this context
    pub fn stats(&self) -> MinerStats {
        let uptime = self.started.elapsed();
        let uptime_secs = uptime.as_secs_f64();
        MinerStats {
            total_hashes: self.total_hashes,
            accepted: self.accepted,
            rejected: self.rejected,
            current_epoch: self.epoch.value(),
            dag_size: if self.backend.dataset_ready() {
                self.geometry.map(|g| g.dag_bytes).unwrap_or(0)
            } else {
                0
            },
            uptime_seconds: uptime.as_secs(),
            hashrate: if uptime_secs > 0.0 {
                self.total_hashes as f64 / uptime_secs
            } else {
                0.0
            },
        }
    }

    /// Tear the context down, releasing device resources
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == MinerState::Shutdown {
            return Ok(());
        }
        self.backend.cleanup()?;
        self.verifier.invalidate();
        self.state = MinerState::Shutdown;

        let stats = self.stats();
        info!(
            total_hashes = stats.total_hashes,
            accepted = stats.accepted,
            rejected = stats.rejected,
            hashrate = %crate::utils::format_hash_rate(stats.hashrate),
            uptime = %crate::utils::format_duration(stats.uptime_seconds),
            "miner context shut down"
        );
        Ok(())
    }

    fn teardown(&mut self, cause: Error) -> Error {
        error!(
            category = cause.category(),
            error = %cause,
            "fatal device error; tearing down context"
        );
        let _ = self.backend.cleanup();
        self.verifier.invalidate();
        self.geometry = None;
        self.state = MinerState::Uninit;
        cause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendKind, CpuBackend, SearchBatch};
    use crate::types::{Hash256, Target};

    fn small_config() -> MinerConfig {
        MinerConfig {
            threads: 2,
            batch_size: 256,
            dag_chunk_items: 256,
            dag_base_size: 1 << 16,
            ..Default::default()
        }
    }

    fn ready_miner() -> Miner {
        let backend = CpuBackend::new(2).unwrap();
        let mut miner = Miner::new(Box::new(backend), small_config()).unwrap();
        miner.generate_dag(Epoch::new(0)).unwrap();
        miner
    }

    fn fixed_job(target: Target) -> MiningJob {
        MiningJob::new(
            "job-fixed",
            Hash256::new([0x01; 32]),
            Hash256::new([0x02; 32]),
            0x12345678,
            0x1d00ffff,
            target,
        )
        .unwrap()
    }

    // target chosen so that of the first 512 nonces of `fixed_job`, exactly
    // 231, 409, 445, 457, 467 and 500 pass
    const SPARSE_TARGET: u64 = 0x01d62f8ee3fab52d;

    #[test]
    fn test_lifecycle_states() {
        let backend = CpuBackend::new(1).unwrap();
        let mut miner = Miner::new(Box::new(backend), small_config()).unwrap();
        assert_eq!(miner.state(), MinerState::Uninit);

        let job = fixed_job(Target::max());
        assert!(matches!(
            miner.submit_job(&job),
            Err(Error::DatasetNotReady)
        ));

        miner.generate_dag(Epoch::new(0)).unwrap();
        assert_eq!(miner.state(), MinerState::Ready);
        assert!(miner.submit_job(&job).is_ok());
        assert_eq!(miner.state(), MinerState::Ready);

        miner.shutdown().unwrap();
        assert_eq!(miner.state(), MinerState::Shutdown);
        assert!(miner.generate_dag(Epoch::new(0)).is_err());
    }

    #[test]
    fn test_epoch_update_requires_regeneration() {
        let mut miner = ready_miner();
        let job = fixed_job(Target::max());
        assert!(miner.submit_job(&job).is_ok());

        miner.update_epoch(Epoch::new(4)).unwrap();
        assert_eq!(miner.state(), MinerState::DagGenerating);
        assert!(matches!(
            miner.submit_job(&job),
            Err(Error::DatasetNotReady)
        ));
        assert_eq!(miner.stats().dag_size, 0);

        miner.generate_dag(Epoch::new(4)).unwrap();
        assert_eq!(miner.state(), MinerState::Ready);
        // epoch 4 is one doubling past epoch 0
        assert_eq!(miner.stats().dag_size, 1 << 17);
        assert!(miner.submit_job(&job).is_ok());
    }

    #[test]
    fn test_update_epoch_same_epoch_is_noop() {
        let mut miner = ready_miner();
        miner.update_epoch(Epoch::new(0)).unwrap();
        assert_eq!(miner.state(), MinerState::Ready);
    }

    #[test]
    fn test_batches_are_monotonic_and_counted() {
        let mut miner = ready_miner();
        let job = fixed_job(Target::new(SPARSE_TARGET));

        let first = miner.submit_job(&job).unwrap();
        assert_eq!(first.start_nonce, Nonce::new(0));
        assert_eq!(first.hashes, 256);
        assert_eq!(
            first.results.iter().map(|r| r.nonce).collect::<Vec<_>>(),
            vec![Nonce::new(231)]
        );

        let second = miner.submit_job(&job).unwrap();
        assert_eq!(second.start_nonce, Nonce::new(256));
        assert_eq!(
            second.results.iter().map(|r| r.nonce).collect::<Vec<_>>(),
            vec![
                Nonce::new(409),
                Nonce::new(445),
                Nonce::new(457),
                Nonce::new(467),
                Nonce::new(500),
            ]
        );

        let stats = miner.stats();
        assert_eq!(stats.total_hashes, 512);
        assert_eq!(stats.accepted, 6);
        assert_eq!(stats.rejected, 0);
        assert_eq!(miner.current_nonce(), Nonce::new(512));
    }

    #[test]
    fn test_job_change_resets_cursor() {
        let mut miner = ready_miner();
        let job_a = fixed_job(Target::min());
        miner.submit_job(&job_a).unwrap();
        assert_eq!(miner.current_nonce(), Nonce::new(256));

        let mut job_b = fixed_job(Target::min());
        job_b.job_id = "job-other".to_string();
        let report = miner.submit_job(&job_b).unwrap();
        assert_eq!(report.start_nonce, Nonce::new(0));
        assert_eq!(miner.current_nonce(), Nonce::new(256));
    }

    #[test]
    fn test_invalid_job_is_rejected() {
        let mut miner = ready_miner();
        let mut job = fixed_job(Target::max());
        job.job_id = String::new();
        assert!(matches!(
            miner.submit_job(&job),
            Err(Error::InvalidJob { .. })
        ));
    }

    /// Backend that claims a hit the kernel never produced
    struct LyingBackend {
        device: DeviceInfo,
        ready: bool,
    }

    impl LyingBackend {
        fn new() -> Self {
            Self {
                device: DeviceInfo {
                    id: 0,
                    name: "lying".into(),
                    memory_bytes: 0,
                    free_bytes: 0,
                    compute_units: 1,
                    available: true,
                },
                ready: false,
            }
        }
    }

    impl PowBackend for LyingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::CpuReference
        }
        fn device(&self) -> &DeviceInfo {
            &self.device
        }
        fn dataset_ready(&self) -> bool {
            self.ready
        }
        fn generate_dag(
            &mut self,
            _epoch: Epoch,
            _seed: &Seed,
            _geometry: Geometry,
            _chunk_items: u64,
        ) -> Result<()> {
            self.ready = true;
            Ok(())
        }
        fn search(
            &self,
            _header: &Header,
            _target: Target,
            start_nonce: Nonce,
            batch_size: u64,
        ) -> Result<SearchBatch> {
            Ok(SearchBatch {
                nonces: vec![start_nonce],
                hashes: batch_size,
                dropped: 0,
            })
        }
        fn cleanup(&mut self) -> Result<()> {
            self.ready = false;
            Ok(())
        }
    }

    #[test]
    fn test_unverifiable_nonce_counts_as_rejected() {
        let mut miner = Miner::new(Box::new(LyingBackend::new()), small_config()).unwrap();
        miner.generate_dag(Epoch::new(0)).unwrap();

        // the claimed nonce cannot meet the hardest target
        let job = fixed_job(Target::min());
        let report = miner.submit_job(&job).unwrap();
        assert!(report.results.is_empty());

        let stats = miner.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.accepted, 0);
        assert_eq!(stats.total_hashes, 256);
    }

    #[tokio::test]
    async fn test_run_job_finds_solution() {
        let mut miner = ready_miner();
        let job = fixed_job(Target::new(SPARSE_TARGET));
        let result = miner
            .run_job(job, CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(result.unwrap().nonce, Nonce::new(231));
    }

    #[tokio::test]
    async fn test_run_job_cancellation() {
        let mut miner = ready_miner();
        let job = fixed_job(Target::min());
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let result = miner.run_job(job, cancellation, None).await;
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_run_job_reports_stats() {
        let mut miner = ready_miner();
        let job = fixed_job(Target::new(SPARSE_TARGET));
        let (tx, mut rx) = mpsc::unbounded_channel();

        miner
            .run_job(job, CancellationToken::new(), Some(tx))
            .await
            .unwrap();

        let stats = rx.recv().await.unwrap();
        assert_eq!(stats.total_hashes, 256);
        assert_eq!(stats.current_epoch, 0);
        assert_eq!(stats.dag_size, 1 << 16);
    }
}
