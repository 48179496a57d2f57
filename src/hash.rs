//! The per-nonce mix-search kernel
//!
//! Keccak-seeded mix state, 64 DAG loads interleaved with KISS99-driven
//! random math, FNV compression, and a final Keccak over the digest. The
//! kernel is pure: identical `(header, nonce, dag)` inputs yield the same
//! 64-bit candidate value on every implementation.

use crate::crypto::{fnv1a, keccak_f800, random_op, Kiss99, FNV_OFFSET};
use crate::dataset::DagSource;
use crate::params::{DAG_LOADS, ITEM_WORDS, MATH_OPS, MIX_WORDS};
use crate::types::{Header, Nonce};

/// Compute the candidate value for one nonce.
///
/// Returns the high 64 bits of the final hash (state words 0 and 1); the
/// nonce wins when this is at most the job target.
pub fn hash_candidate<D: DagSource + ?Sized>(header: &Header, nonce: Nonce, dag: &D) -> u64 {
    // Seed state: header words, then the nonce over words 19 and 20. The
    // overwrite of header word 19 is part of the algorithm.
    let mut state = [0u32; 25];
    state[..Header::WORDS].copy_from_slice(header.words());
    state[19] = nonce.low32();
    state[20] = nonce.high32();
    keccak_f800(&mut state);

    let mut mix = [0u32; MIX_WORDS];
    for (k, word) in mix.iter_mut().enumerate() {
        *word = state[k % 25];
    }

    let z = fnv1a(FNV_OFFSET, state[0]);
    let w = fnv1a(z, state[1]);
    let jsr = fnv1a(w, state[2]);
    let jcong = fnv1a(jsr, state[3]);
    let mut rng = Kiss99::new(z, w, jsr, jcong);

    let n_dag = dag.item_count();
    for round in 0..DAG_LOADS as u32 {
        let dag_idx = fnv1a(
            round ^ mix[round as usize % MIX_WORDS],
            mix[(round as usize + 1) % MIX_WORDS],
        ) as u64
            % n_dag;
        let dag_data = dag.item(dag_idx);

        // only the first 16 mix words take DAG data
        for k in 0..ITEM_WORDS {
            mix[k] = fnv1a(mix[k], dag_data[k]);
        }

        for _ in 0..MATH_OPS {
            let s1 = rng.next() as usize % MIX_WORDS;
            let s2 = rng.next() as usize % MIX_WORDS;
            let dst = rng.next() as usize % MIX_WORDS;
            let op = rng.next();
            mix[dst] = random_op(mix[s1], mix[s2], op);
        }
    }

    // compress 64 mix words down to 8
    let mut digest = [0u32; 25];
    for i in 0..8 {
        let mut value = mix[i * 8];
        for j in 1..8 {
            value = fnv1a(value, mix[i * 8 + j]);
        }
        digest[i] = value;
    }
    keccak_f800(&mut digest);

    ((digest[0] as u64) << 32) | digest[1] as u64
}
