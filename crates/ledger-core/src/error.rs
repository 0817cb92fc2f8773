use thiserror::Error;

/// Errors surfaced by the ledger engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The proof search was abandoned through its cancel token.
    #[error("proof search cancelled")]
    Cancelled,

    /// Every `u64` candidate was tried without satisfying the predicate.
    #[error("proof space exhausted")]
    ProofSpaceExhausted,

    #[error("block index overflow")]
    IndexOverflow,

    /// The backing store holds no genesis block.
    #[error("chain is empty")]
    EmptyChain,

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
