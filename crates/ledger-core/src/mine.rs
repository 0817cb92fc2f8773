use crate::{
    cancel::CancelToken,
    error::{LedgerError, Result},
    pow::{find_proof_with, meets_target, ProofHasher},
};
use rayon::prelude::*;
use tracing::info;

/// How the proof search spreads over CPU cores.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
    #[default]
    Sequential,
    Parallel,
}

impl SearchMode {
    pub fn search<H: ProofHasher + ?Sized>(
        self,
        hasher: &H,
        previous_proof: u64,
        cancel: &CancelToken,
    ) -> Result<u64> {
        match self {
            SearchMode::Sequential => find_proof_with(hasher, previous_proof, cancel),
            SearchMode::Parallel => find_proof_parallel(hasher, previous_proof, cancel),
        }
    }
}

/// Searches candidates across the rayon pool.
///
/// `find_first` keeps the answer identical to the sequential search: the
/// smallest candidate satisfying the predicate.
pub fn find_proof_parallel<H: ProofHasher + ?Sized>(
    hasher: &H,
    previous_proof: u64,
    cancel: &CancelToken,
) -> Result<u64> {
    if cancel.is_cancelled() {
        return Err(LedgerError::Cancelled);
    }

    // A cancelled token makes every remaining candidate "match" so workers
    // wind down; the flag is checked again below.
    let found = (1u64..=u64::MAX)
        .into_par_iter()
        .find_first(|&candidate| {
            cancel.is_cancelled() || meets_target(hasher, previous_proof, candidate)
        });

    if cancel.is_cancelled() {
        return Err(LedgerError::Cancelled);
    }
    let proof = found.ok_or(LedgerError::ProofSpaceExhausted)?;
    info!(previous_proof, proof, "parallel search found proof");
    Ok(proof)
}
