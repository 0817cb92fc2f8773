use crate::cancel::CancelToken;
use crate::constants::POW_PREFIX;
use crate::error::{LedgerError, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Digest used by the proof-of-work predicate, returned as lowercase hex.
///
/// Any `Fn(&[u8]) -> String` works, which lets tests swap in a cheap stub.
pub trait ProofHasher: Sync {
    fn hex_digest(&self, input: &[u8]) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

impl ProofHasher for Sha256Hasher {
    fn hex_digest(&self, input: &[u8]) -> String {
        hex::encode(Sha256::digest(input))
    }
}

impl<F> ProofHasher for F
where
    F: Fn(&[u8]) -> String + Sync,
{
    fn hex_digest(&self, input: &[u8]) -> String {
        self(input)
    }
}

/// Decimal form of `proof² − previous_proof²`, with a leading `-` when negative.
///
/// Squares are taken in `u128` so the result is exact for every `u64` pair.
pub fn proof_operand(previous_proof: u64, proof: u64) -> String {
    let previous_sq = u128::from(previous_proof) * u128::from(previous_proof);
    let sq = u128::from(proof) * u128::from(proof);
    if sq >= previous_sq {
        (sq - previous_sq).to_string()
    } else {
        format!("-{}", previous_sq - sq)
    }
}

pub fn meets_target<H: ProofHasher + ?Sized>(hasher: &H, previous_proof: u64, proof: u64) -> bool {
    hasher
        .hex_digest(proof_operand(previous_proof, proof).as_bytes())
        .starts_with(POW_PREFIX)
}

/// The proof-of-work predicate under SHA-256.
pub fn is_valid_proof(previous_proof: u64, proof: u64) -> bool {
    meets_target(&Sha256Hasher, previous_proof, proof)
}

/// Smallest `proof >= 1` satisfying the predicate for `previous_proof`.
/// Runs until found; use [`find_proof_cancellable`] to bound it.
pub fn find_proof(previous_proof: u64) -> Result<u64> {
    find_proof_with(&Sha256Hasher, previous_proof, &CancelToken::new())
}

pub fn find_proof_cancellable(previous_proof: u64, cancel: &CancelToken) -> Result<u64> {
    find_proof_with(&Sha256Hasher, previous_proof, cancel)
}

/// Linear search from 1 with a caller-supplied digest.
pub fn find_proof_with<H: ProofHasher + ?Sized>(
    hasher: &H,
    previous_proof: u64,
    cancel: &CancelToken,
) -> Result<u64> {
    search_from(hasher, previous_proof, 1, cancel)
}

pub(crate) fn search_from<H: ProofHasher + ?Sized>(
    hasher: &H,
    previous_proof: u64,
    start: u64,
    cancel: &CancelToken,
) -> Result<u64> {
    for candidate in start..=u64::MAX {
        if cancel.is_cancelled() {
            debug!(previous_proof, candidate, "proof search cancelled");
            return Err(LedgerError::Cancelled);
        }
        if meets_target(hasher, previous_proof, candidate) {
            debug!(previous_proof, proof = candidate, "proof found");
            return Ok(candidate);
        }
    }
    Err(LedgerError::ProofSpaceExhausted)
}
