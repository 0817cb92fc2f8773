use crate::{
    cancel::CancelToken,
    error::{LedgerError, Result},
    mine::SearchMode,
    pow::{is_valid_proof, Sha256Hasher},
    timestamp_now, Block,
};
use std::sync::{Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Backing storage for the chain. The ledger is the only writer.
///
/// Lives in `ledger-core` so a durable backend can be dropped in behind
/// [`Ledger`] without touching its public contract.
pub trait ChainStore: Send + Sync {
    fn push(&self, block: Block) -> Result<()>;
    fn get(&self, index: u64) -> Result<Option<Block>>;
    fn tail(&self) -> Result<Option<Block>>;
    fn len(&self) -> Result<u64>;
    /// Snapshot copy of every block in index order.
    fn blocks(&self) -> Result<Vec<Block>>;
}

fn poisoned<T>(_: PoisonError<T>) -> LedgerError {
    LedgerError::Storage("lock poisoned".into())
}

/// In-process block list; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<Vec<Block>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks: RwLock::new(blocks),
        }
    }
}

impl ChainStore for MemoryStore {
    fn push(&self, block: Block) -> Result<()> {
        self.blocks.write().map_err(poisoned)?.push(block);
        Ok(())
    }

    fn get(&self, index: u64) -> Result<Option<Block>> {
        let blocks = self.blocks.read().map_err(poisoned)?;
        let Some(position) = index.checked_sub(1) else {
            return Ok(None);
        };
        Ok(usize::try_from(position)
            .ok()
            .and_then(|p| blocks.get(p))
            .cloned())
    }

    fn tail(&self) -> Result<Option<Block>> {
        Ok(self.blocks.read().map_err(poisoned)?.last().cloned())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.blocks.read().map_err(poisoned)?.len() as u64)
    }

    fn blocks(&self) -> Result<Vec<Block>> {
        Ok(self.blocks.read().map_err(poisoned)?.clone())
    }
}

/// The ledger engine: owns the chain, appends blocks and mines new ones.
///
/// Appends (tail read + push) are serialized by one lock; miners queue on a
/// second lock so only one search runs per ledger. Readers go straight to the
/// store and see a consistent snapshot.
///
/// The store moves into the ledger and is not handed back out, so every
/// write goes through the append lock:
///
/// ```compile_fail
/// use ledger_core::{Block, ChainStore, Ledger};
///
/// let ledger = Ledger::new();
/// ledger.store().push(Block::new(9, "x", 1, "zz")).unwrap();
/// ```
pub struct Ledger<S: ChainStore = MemoryStore> {
    store: S,
    append: Mutex<()>,
    mining: Mutex<()>,
}

impl Ledger<MemoryStore> {
    /// In-memory ledger holding just the genesis block.
    pub fn new() -> Self {
        let genesis = Block::genesis();
        info!(timestamp = %genesis.timestamp, "genesis block created");
        Self::from_parts(MemoryStore::with_blocks(vec![genesis]))
    }
}

impl Default for Ledger<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ChainStore> Ledger<S> {
    /// Wraps `store`, writing a genesis block if it holds none. Idempotent.
    pub fn open(store: S) -> Result<Self> {
        let ledger = Self::from_parts(store);
        if ledger.store.len()? == 0 {
            let genesis = Block::genesis();
            ledger.store.push(genesis.clone())?;
            info!(timestamp = %genesis.timestamp, "genesis block created");
        }
        Ok(ledger)
    }

    fn from_parts(store: S) -> Self {
        Self {
            store,
            append: Mutex::new(()),
            mining: Mutex::new(()),
        }
    }

    /// Appends a block with `index = len + 1` and the current time.
    ///
    /// The proof is not checked here; [`is_chain_valid`] is the verifier.
    pub fn create_block(&self, proof: u64, previous_hash: impl Into<String>) -> Result<Block> {
        let _append = self.append.lock().map_err(poisoned)?;
        self.append_locked(proof, previous_hash.into())
    }

    fn append_locked(&self, proof: u64, previous_hash: String) -> Result<Block> {
        let index = self
            .store
            .len()?
            .checked_add(1)
            .ok_or(LedgerError::IndexOverflow)?;
        let block = Block {
            index,
            timestamp: timestamp_now(),
            proof,
            previous_hash,
        };
        self.store.push(block.clone())?;
        info!(index, proof, "block appended");
        Ok(block)
    }

    /// Last block. Never absent for a ledger built by `new` or `open`.
    pub fn tail_block(&self) -> Result<Block> {
        self.store.tail()?.ok_or(LedgerError::EmptyChain)
    }

    pub fn block(&self, index: u64) -> Result<Option<Block>> {
        self.store.get(index)
    }

    pub fn chain(&self) -> Result<Vec<Block>> {
        self.store.blocks()
    }

    pub fn len(&self) -> Result<u64> {
        self.store.len()
    }

    /// Always false for a ledger built by `new` or `open`.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Validates a snapshot of the current chain.
    pub fn is_valid(&self) -> Result<bool> {
        let chain = self.chain()?;
        match validate_chain(&chain) {
            Ok(()) => {
                debug!(length = chain.len(), "chain is valid");
                Ok(true)
            }
            Err(violation) => {
                warn!(%violation, "chain is invalid");
                Ok(false)
            }
        }
    }

    /// Sequential [`Ledger::mine_with`].
    pub fn mine(&self, cancel: &CancelToken) -> Result<Block> {
        self.mine_with(SearchMode::Sequential, cancel)
    }

    /// Finds a proof for the tail and appends the block that carries it.
    ///
    /// The search runs without holding the append lock. If the tail moved
    /// while searching, the search restarts from the new tail. Cancellation
    /// returns [`LedgerError::Cancelled`] and leaves the chain untouched.
    pub fn mine_with(&self, mode: SearchMode, cancel: &CancelToken) -> Result<Block> {
        let _miner = self.mining.lock().map_err(poisoned)?;
        loop {
            let tail = self.tail_block()?;
            let proof = mode.search(&Sha256Hasher, tail.proof, cancel)?;
            if let Some(block) = self.append_if_tail(&tail, proof, cancel)? {
                info!(index = block.index, proof, "block mined");
                return Ok(block);
            }
            debug!(index = tail.index, "tail moved during search, restarting");
        }
    }

    /// Appends a block on top of `tail` if it is still the tail and the
    /// search has not been cancelled. `None` means the tail moved.
    fn append_if_tail(
        &self,
        tail: &Block,
        proof: u64,
        cancel: &CancelToken,
    ) -> Result<Option<Block>> {
        let _append = self.append.lock().map_err(poisoned)?;
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        if self.tail_block()? != *tail {
            return Ok(None);
        }
        self.append_locked(proof, tail.hash()).map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ViolationKind {
    #[error("previous_hash does not match the preceding block")]
    BrokenLink,
    #[error("proof does not satisfy the proof-of-work predicate")]
    InvalidProof,
}

/// First rule broken by a chain, located by the offending block's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("block {index}: {kind}")]
pub struct ChainViolation {
    pub index: u64,
    pub kind: ViolationKind,
}

/// Checks every adjacent pair for hash linkage and proof-of-work.
///
/// `chain` must not be empty.
pub fn validate_chain(chain: &[Block]) -> std::result::Result<(), ChainViolation> {
    debug_assert!(!chain.is_empty(), "a chain always holds its genesis block");
    for pair in chain.windows(2) {
        let (previous, block) = (&pair[0], &pair[1]);
        if block.previous_hash != previous.hash() {
            return Err(ChainViolation {
                index: block.index,
                kind: ViolationKind::BrokenLink,
            });
        }
        if !is_valid_proof(previous.proof, block.proof) {
            return Err(ChainViolation {
                index: block.index,
                kind: ViolationKind::InvalidProof,
            });
        }
    }
    Ok(())
}

pub fn is_chain_valid(chain: &[Block]) -> bool {
    validate_chain(chain).is_ok()
}
