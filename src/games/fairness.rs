//! Provably fair round seeds.
//!
//! Every round draws a fresh 32-byte seed. The SHA-256 commitment of the seed
//! is published while bets are open and the seed itself is revealed when the
//! round crashes, so anyone can recompute the crash point afterwards.

use crate::errors::EngineFault;
use crate::games::outcome::CrashPoint;
use crate::games::rng::RandomSource;
use crate::games::types::RoundId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const SEED_LEN: usize = 32;

/// Secret per-round seed
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RoundSeed([u8; SEED_LEN]);

impl RoundSeed {
    pub fn generate(rng: &mut dyn RandomSource) -> Result<Self, EngineFault> {
        let mut bytes = [0u8; SEED_LEN];
        rng.fill(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(encoded: &str) -> Result<Self, FairnessError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| FairnessError::InvalidSeed(e.to_string()))?;
        let bytes: [u8; SEED_LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| FairnessError::InvalidSeed(format!("expected {} bytes, got {}", SEED_LEN, v.len())))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Hex SHA-256 of the seed, published before the round starts.
    pub fn commitment(&self) -> String {
        hex::encode(Sha256::digest(self.0))
    }

    /// Uniform draw in (0, 1) bound to this seed and round.
    ///
    /// Takes the top 53 bits of `SHA-256(seed || round_id_le)` and centres
    /// them in their bucket so the result can never be exactly 0 or 1.
    pub fn unit_draw(&self, round_id: RoundId) -> f64 {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(round_id.0.to_le_bytes());
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bits = u64::from_be_bytes(head) >> 11;
        (bits as f64 + 0.5) / (1u64 << 53) as f64
    }
}

impl fmt::Debug for RoundSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoundSeed({}..)", &self.commitment()[..8])
    }
}

/// Result of recomputing a round from its revealed seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub round_id: RoundId,
    pub crash_point: CrashPoint,
    pub seed_hash: String,
}

/// Recompute the commitment and crash point for a revealed seed.
pub fn verify(round_id: RoundId, seed_hex: &str) -> Result<Verification, FairnessError> {
    let seed = RoundSeed::from_hex(seed_hex)?;
    Ok(Verification {
        round_id,
        crash_point: CrashPoint::from_unit(seed.unit_draw(round_id)),
        seed_hash: seed.commitment(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FairnessError {
    #[error("invalid seed: {0}")]
    InvalidSeed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_commitment_is_sha256_of_seed() {
        let seed = RoundSeed::from_bytes([0u8; SEED_LEN]);
        assert_eq!(
            seed.commitment(),
            "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
        );
    }

    #[test]
    fn test_hex_roundtrip_and_rejects_short_seed() {
        let mut rng = StdRng::seed_from_u64(3);
        let seed = RoundSeed::generate(&mut rng).unwrap();
        assert_eq!(RoundSeed::from_hex(&seed.to_hex()).unwrap(), seed);

        assert!(matches!(
            RoundSeed::from_hex("abcd"),
            Err(FairnessError::InvalidSeed(_))
        ));
        assert!(RoundSeed::from_hex("zz").is_err());
    }

    #[test]
    fn test_unit_draw_depends_on_round() {
        let seed = RoundSeed::from_bytes([9u8; SEED_LEN]);
        let first = seed.unit_draw(RoundId(1));
        let second = seed.unit_draw(RoundId(2));
        assert!(first > 0.0 && first < 1.0);
        assert_ne!(first, second);
        assert_eq!(first, seed.unit_draw(RoundId(1)));
    }

    #[test]
    fn test_verify_reproduces_crash_point() {
        let seed = RoundSeed::from_bytes([5u8; SEED_LEN]);
        let round = RoundId(77);
        let expected = CrashPoint::from_unit(seed.unit_draw(round));

        let verification = verify(round, &seed.to_hex()).unwrap();
        assert_eq!(verification.crash_point, expected);
        assert_eq!(verification.seed_hash, seed.commitment());
    }
}
