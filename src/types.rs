//! Core types for AdaptivePow mining
//!
//! Fundamental types used throughout the miner core with proper validation,
//! binary encoding, and JSON serialization.

use crate::crypto::epoch_seed;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted job identifier length
pub const MAX_JOB_ID_LEN: usize = 32;

/// Proof-of-work nonce (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nonce(pub u64);

impl Nonce {
    /// Create a new nonce
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the nonce value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Low 32 bits, as placed into the seed state
    pub fn low32(&self) -> u32 {
        self.0 as u32
    }

    /// High 32 bits, as placed into the seed state
    pub fn high32(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    /// Advance by `count`, wrapping at the end of the nonce space
    pub fn advance(&mut self, count: u64) {
        self.0 = self.0.wrapping_add(count);
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Dataset generation identifier (one per 180-day window)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Epoch(pub u32);

impl Epoch {
    /// Create a new epoch
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the epoch value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Epoch seed: the 32-byte value the cache is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed([u8; 32]);

impl Seed {
    /// Derive the seed for an epoch (Keccak-256 of the epoch number)
    pub fn derive(epoch: Epoch) -> Self {
        Self(epoch_seed(epoch.value()))
    }

    /// Get the seed bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Seed as eight little-endian 32-bit words
    pub fn words(&self) -> [u32; 8] {
        let mut words = [0u32; 8];
        LittleEndian::read_u32_into(&self.0, &mut words);
        words
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A 256-bit hash value (previous block hash, merkle root)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// Create from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// All-zero hash
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from a byte slice
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::invalid_job(format!(
                "invalid hash length: expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(bytes);
        Ok(Self(array))
    }

    /// View as eight little-endian 32-bit words
    pub fn to_le_words(&self) -> [u32; 8] {
        let mut words = [0u32; 8];
        LittleEndian::read_u32_into(&self.0, &mut words);
        words
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Hash256 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::invalid_job(format!("invalid hex in hash: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Hash256 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Hash256::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Mining target: a 64-bit difficulty threshold.
///
/// A candidate passes when the high 64 bits of its final hash, composed
/// big-endian from state words 0 and 1, are less than or equal to this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target(pub u64);

impl Target {
    /// Create a new target
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the target value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Maximum possible target (easiest difficulty)
    pub fn max() -> Self {
        Self(u64::MAX)
    }

    /// Minimum possible target (hardest difficulty)
    pub fn min() -> Self {
        Self(0)
    }

    /// Derive the 64-bit target from a compact `nBits` encoding.
    ///
    /// Thresholds finer than 64 bits cannot be represented; the result
    /// saturates to zero there.
    pub fn from_bits(n_bits: u32) -> Self {
        let size = n_bits >> 24;
        let word = (n_bits & 0x007f_ffff) as u64;

        if size <= 3 {
            Self(word >> (8 * (3 - size)))
        } else {
            let shift = (size - 3) * 8;
            if shift >= 64 {
                Self(0)
            } else {
                Self(u64::MAX >> shift)
            }
        }
    }

    /// Check whether a candidate hash meets this target
    pub fn met_by(&self, hash_high: u64) -> bool {
        hash_high <= self.0
    }

    /// Difficulty relative to the maximum target
    pub fn difficulty(&self) -> f64 {
        if self.0 == 0 {
            return 0.0;
        }
        u64::MAX as f64 / self.0 as f64
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = u64::from_str_radix(s, 16)
            .map_err(|e| Error::invalid_job(format!("invalid hex in target: {}", e)))?;
        Ok(Self(value))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for Target {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{:016x}", self.0))
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Target::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Expand a compact `nBits` encoding to the full 256-bit target bytes.
///
/// The three mantissa bytes land at offset `size - 3` as in the classic
/// compact encoding; sizes of 3 or less shift the mantissa down instead.
pub fn bits_to_target256(n_bits: u32) -> [u8; 32] {
    let mut target = [0u8; 32];
    let size = (n_bits >> 24) as usize;
    let mut word = n_bits & 0x007f_ffff;

    if size <= 3 {
        word >>= 8 * (3 - size);
        target[0] = word as u8;
        target[1] = (word >> 8) as u8;
        target[2] = (word >> 16) as u8;
    } else {
        let offset = (size - 3).min(29);
        target[offset] = word as u8;
        target[offset + 1] = (word >> 8) as u8;
        target[offset + 2] = (word >> 16) as u8;
    }

    target
}

/// Block header as seen by the search kernel: 20 little-endian 32-bit words.
///
/// Words [0..8) previous hash, [8..16) merkle root, [16] time, [17] bits,
/// [18..20) nonce slot (filled per work-item by the kernel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header([u32; 20]);

impl Header {
    /// Number of header words
    pub const WORDS: usize = 20;

    /// Build the header words for a mining job, nonce slot zeroed
    pub fn for_job(job: &MiningJob) -> Self {
        let mut words = [0u32; 20];
        words[..8].copy_from_slice(&job.prev_hash.to_le_words());
        words[8..16].copy_from_slice(&job.merkle_root.to_le_words());
        words[16] = job.n_time;
        words[17] = job.n_bits;
        Self(words)
    }

    /// Create from raw words
    pub fn from_words(words: [u32; 20]) -> Self {
        Self(words)
    }

    /// Get the header words
    pub fn words(&self) -> &[u32; 20] {
        &self.0
    }
}

/// A unit of work handed to the miner by the pool layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningJob {
    /// Pool-assigned job identifier (at most 32 characters)
    pub job_id: String,
    /// Previous block hash
    pub prev_hash: Hash256,
    /// Merkle root
    pub merkle_root: Hash256,
    /// Block time
    pub n_time: u32,
    /// Compact difficulty bits
    pub n_bits: u32,
    /// 64-bit share target
    pub target: Target,
}

impl MiningJob {
    /// Create a new job, validating the identifier
    pub fn new(
        job_id: impl Into<String>,
        prev_hash: Hash256,
        merkle_root: Hash256,
        n_time: u32,
        n_bits: u32,
        target: Target,
    ) -> Result<Self> {
        let job = Self {
            job_id: job_id.into(),
            prev_hash,
            merkle_root,
            n_time,
            n_bits,
            target,
        };
        job.validate()?;
        Ok(job)
    }

    /// Validate job fields
    pub fn validate(&self) -> Result<()> {
        if self.job_id.is_empty() {
            return Err(Error::invalid_job("empty job id"));
        }
        if self.job_id.len() > MAX_JOB_ID_LEN {
            return Err(Error::invalid_job(format!(
                "job id too long: {} > {}",
                self.job_id.len(),
                MAX_JOB_ID_LEN
            )));
        }
        Ok(())
    }
}

/// Result of a search for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningResult {
    /// Job the nonce belongs to
    pub job_id: String,
    /// The winning nonce
    pub nonce: Nonce,
    /// Whether a solution was found
    pub found: bool,
}

/// Aggregate statistics for one device context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct MinerStats {
    /// Total hashes attempted
    pub total_hashes: u64,
    /// Shares that passed CPU verification
    pub accepted: u64,
    /// Reported nonces that failed CPU verification
    pub rejected: u64,
    /// Epoch the current dataset belongs to
    pub current_epoch: u32,
    /// Size of the resident DAG in bytes (0 while not ready)
    pub dag_size: u64,
    /// Seconds since the context was created
    pub uptime_seconds: u64,
    /// Average hashes per second over the uptime
    pub hashrate: f64,
}
