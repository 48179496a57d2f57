//! CPU verification of found nonces
//!
//! Recomputes the search kernel for a single nonce against a cache-backed
//! dataset view, so acceptance never depends on a GPU result. The cache is
//! built lazily per epoch and reused across checks.

use crate::dataset::{Cache, LightDag};
use crate::hash::hash_candidate;
use crate::params::Geometry;
use crate::types::{Epoch, Header, MiningJob, Nonce, Seed, Target};
use crate::{Error, Result};
use tracing::{debug, info};

/// Deterministic single-nonce verifier for one epoch at a time
pub struct Verifier {
    epoch: Option<Epoch>,
    light: Option<LightDag>,
}

impl Verifier {
    /// Create an empty verifier; `prepare` builds the dataset view
    pub fn new() -> Self {
        Self {
            epoch: None,
            light: None,
        }
    }

    /// Whether the verifier currently holds a dataset view for `epoch`
    pub fn is_prepared_for(&self, epoch: Epoch) -> bool {
        self.epoch == Some(epoch) && self.light.is_some()
    }

    /// Build (or reuse) the cache-backed dataset view for an epoch.
    ///
    /// Building the cache is sequential and costs one Keccak per item; it is
    /// kept until the epoch changes or `invalidate` is called.
    pub fn prepare(&mut self, epoch: Epoch, geometry: Geometry) -> Result<()> {
        if self.is_prepared_for(epoch) {
            return Ok(());
        }

        info!(
            epoch = epoch.value(),
            cache_size = %crate::utils::format_bytes(geometry.cache_bytes),
            "building verifier cache"
        );
        let seed = Seed::derive(epoch);
        let cache = Cache::generate(&seed, geometry.n_cache)?;
        self.light = Some(LightDag::new(cache, geometry.n_dag));
        self.epoch = Some(epoch);
        Ok(())
    }

    /// Drop the current dataset view
    pub fn invalidate(&mut self) {
        self.epoch = None;
        self.light = None;
    }

    /// Recompute the candidate value for a nonce.
    ///
    /// Fails with `DatasetNotReady` before `prepare`.
    pub fn candidate(&self, header: &Header, nonce: Nonce) -> Result<u64> {
        let light = self.light.as_ref().ok_or(Error::DatasetNotReady)?;
        Ok(hash_candidate(header, nonce, light))
    }

    /// Check a nonce against a target
    pub fn check(&self, header: &Header, nonce: Nonce, target: Target) -> Result<bool> {
        let candidate = self.candidate(header, nonce)?;
        let accepted = target.met_by(candidate);
        debug!(
            nonce = %nonce,
            candidate = %format!("{:016x}", candidate),
            target = %target,
            accepted,
            "verified nonce"
        );
        Ok(accepted)
    }

    /// Validate a job and check one of its reported nonces, preparing the
    /// dataset view for `epoch` if needed
    pub fn verify_solution(
        &mut self,
        job: &MiningJob,
        nonce: Nonce,
        epoch: Epoch,
        geometry: Geometry,
    ) -> Result<bool> {
        job.validate()?;
        self.prepare(epoch, geometry)?;
        self.check(&Header::for_job(job), nonce, job.target)
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_geometry() -> Geometry {
        Geometry::from_dag_size(4096).unwrap()
    }

    #[test]
    fn test_verifier_requires_prepare() {
        let verifier = Verifier::new();
        let header = Header::from_words([0u32; 20]);
        assert!(matches!(
            verifier.candidate(&header, Nonce::new(0)),
            Err(Error::DatasetNotReady)
        ));
    }

    #[test]
    fn test_verifier_prepare_is_idempotent() {
        let mut verifier = Verifier::new();
        let geometry = tiny_geometry();
        verifier.prepare(Epoch::new(0), geometry).unwrap();
        assert!(verifier.is_prepared_for(Epoch::new(0)));
        verifier.prepare(Epoch::new(0), geometry).unwrap();
        assert!(verifier.is_prepared_for(Epoch::new(0)));

        verifier.invalidate();
        assert!(!verifier.is_prepared_for(Epoch::new(0)));
    }

    #[test]
    fn test_verifier_accepts_and_rejects_by_target() {
        let mut verifier = Verifier::new();
        verifier.prepare(Epoch::new(0), tiny_geometry()).unwrap();

        let header = Header::from_words([0u32; 20]);
        let candidate = verifier.candidate(&header, Nonce::new(0)).unwrap();

        assert!(verifier
            .check(&header, Nonce::new(0), Target::new(candidate))
            .unwrap());
        assert!(!verifier
            .check(&header, Nonce::new(0), Target::new(candidate - 1))
            .unwrap());
        assert!(verifier
            .check(&header, Nonce::new(0), Target::max())
            .unwrap());
        assert!(!verifier
            .check(&header, Nonce::new(0), Target::min())
            .unwrap());
    }
}
