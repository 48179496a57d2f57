//! End-to-end pipeline tests
//!
//! Drives the full epoch → seed → cache → DAG → search → verify flow on a
//! reduced dataset geometry, checking that the batch driver, the reference
//! search kernel, and the CPU verifier agree nonce for nonce.

use adaptivepow_miner::dataset::{Cache, Dag, DagSource, LightDag};
use adaptivepow_miner::hash::hash_candidate;
use adaptivepow_miner::params::Geometry;
use adaptivepow_miner::{
    bits_to_target256, create_backend, BackendKind, Epoch, Error, Hash256, Header, Miner,
    MinerConfig, MiningJob, Nonce, Seed, Target, Verifier,
};
use tokio_util::sync::CancellationToken;

const SMALL_DAG_BYTES: u64 = 1 << 16; // 1024 items, 16 cache items
const SMALL_BATCH: u64 = 256;

fn small_config() -> MinerConfig {
    MinerConfig {
        threads: 2,
        batch_size: SMALL_BATCH,
        dag_chunk_items: 256,
        dag_base_size: SMALL_DAG_BYTES,
        ..Default::default()
    }
}

fn ready_miner() -> Miner {
    let config = small_config();
    let backend = create_backend(BackendKind::CpuReference, &config).expect("backend");
    let mut miner = Miner::new(backend, config).expect("miner");
    miner.generate_dag(Epoch::new(0)).expect("dag generation");
    miner
}

fn fixed_job(target: Target) -> MiningJob {
    MiningJob::new(
        "e2e-job",
        Hash256::new([0x01; 32]),
        Hash256::new([0x02; 32]),
        0x12345678,
        0x1d00ffff,
        target,
    )
    .unwrap()
}

/// Of the first 512 nonces of `fixed_job`, exactly these pass this target.
const SPARSE_TARGET: u64 = 0x01d62f8ee3fab52d;
const SPARSE_WINNERS: [u64; 6] = [231, 409, 445, 457, 467, 500];

#[test]
fn max_target_accepts_any_nonce() {
    let mut verifier = Verifier::new();
    let geometry = Geometry::from_dag_size(SMALL_DAG_BYTES).unwrap();
    verifier.prepare(Epoch::new(0), geometry).unwrap();

    let header = Header::from_words([0u32; 20]);
    assert!(verifier
        .check(&header, Nonce::new(0), Target::max())
        .unwrap());
}

#[test]
fn min_target_accepts_nothing() {
    let mut miner = ready_miner();
    let job = fixed_job(Target::min());

    let mut probed = 0u64;
    for _ in 0..4 {
        let report = miner.submit_job(&job).unwrap();
        assert!(report.results.is_empty());
        probed += report.hashes;
    }
    assert_eq!(probed, 4 * SMALL_BATCH);
    assert_eq!(miner.stats().accepted, 0);
}

#[test]
fn search_and_verifier_agree_on_winners() {
    let mut miner = ready_miner();
    let job = fixed_job(Target::new(SPARSE_TARGET));

    let mut found: Vec<u64> = Vec::new();
    for _ in 0..2 {
        let report = miner.submit_job(&job).unwrap();
        found.extend(report.results.iter().map(|r| r.nonce.value()));
    }
    assert_eq!(found, SPARSE_WINNERS);

    // every winner passed the CPU verifier inside submit_job
    let stats = miner.stats();
    assert_eq!(stats.accepted, SPARSE_WINNERS.len() as u64);
    assert_eq!(stats.rejected, 0);

    // and the verifier independently rejects a non-winner
    let mut verifier = Verifier::new();
    let geometry = Geometry::from_dag_size(SMALL_DAG_BYTES).unwrap();
    verifier.prepare(Epoch::new(0), geometry).unwrap();
    let header = Header::for_job(&job);
    assert!(!verifier
        .check(&header, Nonce::new(0), Target::new(SPARSE_TARGET))
        .unwrap());
}

#[test]
fn resident_and_light_datasets_hash_identically() {
    let geometry = Geometry::from_dag_size(SMALL_DAG_BYTES).unwrap();
    let seed = Seed::derive(Epoch::new(0));

    // searcher path: fully resident DAG
    let cache = Cache::generate(&seed, geometry.n_cache).unwrap();
    let dag = Dag::generate(&cache, geometry.n_dag, 256).unwrap();

    // verifier path: items recomputed from an independent cache
    let light_cache = Cache::generate(&seed, geometry.n_cache).unwrap();
    let light = LightDag::new(light_cache, geometry.n_dag);

    let job = fixed_job(Target::max());
    let header = Header::for_job(&job);
    for nonce in [0u64, 1, 231, 255, 409, 511, 0xdeadbeef] {
        assert_eq!(
            hash_candidate(&header, Nonce::new(nonce), &dag),
            hash_candidate(&header, Nonce::new(nonce), &light),
            "candidate mismatch at nonce {}",
            nonce
        );
    }
    assert_eq!(dag.item_count(), light.item_count());
}

#[test]
fn compact_bits_expand_to_reference_target() {
    let target = bits_to_target256(0x1d00ffff);
    let mut expected = [0u8; 32];
    expected[26] = 0xff;
    expected[27] = 0xff;
    assert_eq!(target, expected);

    // 64-bit form: thresholds below 2^-64 granularity saturate to zero
    assert_eq!(Target::from_bits(0x1d00ffff), Target::min());
    assert_eq!(Target::from_bits(0x0400ffff).value(), u64::MAX >> 8);
}

#[test]
fn epoch_change_blocks_jobs_until_regeneration() {
    let mut miner = ready_miner();
    let job = fixed_job(Target::max());
    assert!(miner.submit_job(&job).is_ok());

    miner.update_epoch(Epoch::new(4)).unwrap();
    assert!(matches!(
        miner.submit_job(&job),
        Err(Error::DatasetNotReady)
    ));

    miner.generate_dag(Epoch::new(4)).unwrap();
    assert_eq!(miner.stats().dag_size, SMALL_DAG_BYTES * 2);
    assert!(miner.submit_job(&job).is_ok());
}

#[test]
fn sequential_batches_cover_the_nonce_space_once() {
    let mut miner = ready_miner();
    let job = fixed_job(Target::new(SPARSE_TARGET));

    let first = miner.submit_job(&job).unwrap();
    let second = miner.submit_job(&job).unwrap();

    assert_eq!(first.start_nonce, Nonce::new(0));
    assert_eq!(second.start_nonce, Nonce::new(SMALL_BATCH));
    assert_eq!(miner.current_nonce(), Nonce::new(2 * SMALL_BATCH));
    assert_eq!(miner.stats().total_hashes, 2 * SMALL_BATCH);

    // winners land in the batch that owns their nonce range
    assert!(first
        .results
        .iter()
        .all(|r| r.nonce.value() < SMALL_BATCH));
    assert!(second
        .results
        .iter()
        .all(|r| r.nonce.value() >= SMALL_BATCH && r.nonce.value() < 2 * SMALL_BATCH));
}

#[test]
fn dataset_generation_is_deterministic_across_runs() {
    let geometry = Geometry::from_dag_size(SMALL_DAG_BYTES).unwrap();
    let seed = Seed::derive(Epoch::new(7));

    let cache_a = Cache::generate(&seed, geometry.n_cache).unwrap();
    let cache_b = Cache::generate(&seed, geometry.n_cache).unwrap();
    let dag_a = Dag::generate(&cache_a, geometry.n_dag, 100).unwrap();
    let dag_b = Dag::generate(&cache_b, geometry.n_dag, 256).unwrap();

    for i in (0..geometry.n_dag).step_by(97) {
        assert_eq!(dag_a.item(i), dag_b.item(i), "item {} diverged", i);
    }
}

#[tokio::test]
async fn run_job_full_flow() {
    let mut miner = ready_miner();
    let job = fixed_job(Target::new(SPARSE_TARGET));

    let result = miner
        .run_job(job.clone(), CancellationToken::new(), None)
        .await
        .unwrap()
        .expect("solution exists in the first window");
    assert_eq!(result.job_id, job.job_id);
    assert_eq!(result.nonce, Nonce::new(SPARSE_WINNERS[0]));
    assert!(result.found);

    miner.shutdown().unwrap();
}
