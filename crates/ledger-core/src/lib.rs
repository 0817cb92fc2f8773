pub mod cancel;
pub mod chain;
pub mod constants;
mod encoding;
pub mod error;
pub mod mine;
pub mod pow;

use crate::constants::{GENESIS_PREVIOUS_HASH, GENESIS_PROOF, TIMESTAMP_FORMAT};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use cancel::{CancelOnDrop, CancelToken};
pub use chain::{
    is_chain_valid, validate_chain, ChainStore, ChainViolation, Ledger, MemoryStore,
    ViolationKind,
};
pub use error::{LedgerError, Result};
pub use mine::SearchMode;
pub use pow::{find_proof, is_valid_proof};

/// A single ledger entry. Exactly these four fields are hashed and exposed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: String,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: impl Into<String>,
        proof: u64,
        previous_hash: impl Into<String>,
    ) -> Self {
        Self {
            index,
            timestamp: timestamp.into(),
            proof,
            previous_hash: previous_hash.into(),
        }
    }

    /// The hard-coded first block, stamped with the current time.
    pub fn genesis() -> Self {
        Self::new(1, timestamp_now(), GENESIS_PROOF, GENESIS_PREVIOUS_HASH)
    }

    /// Canonical encoding fed to the digest: sorted keys, `", "` and `": "`
    /// separators, non-printable-ASCII escaped as `\uXXXX`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        encoding::canonical_block(self)
    }

    /// Lowercase hex SHA-256 of [`Block::canonical_bytes`].
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_bytes()))
    }
}

/// Free-function form of [`Block::hash`].
pub fn hash(block: &Block) -> String {
    block.hash()
}

/// Local wall-clock time in the ledger's timestamp format.
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HASH_HEX_SIZE;

    fn fixed_block() -> Block {
        Block::new(1, "2024-01-01 00:00:00.000000", 1, "0")
    }

    #[test]
    fn genesis_block_example() {
        let genesis = Block::genesis();
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.proof, 1);
        assert_eq!(genesis.previous_hash, "0");
        assert!(!genesis.timestamp.is_empty());
    }

    #[test]
    fn block_hash_example() {
        assert_eq!(
            fixed_block().hash(),
            "88663c6108060456ee58ee5e05c87d24da9b48ed31c3aa63b2c47bfc1fd04c61"
        );
    }

    #[test]
    fn block_hash_is_lowercase_hex_of_fixed_width() {
        let hash = Block::genesis().hash();
        assert_eq!(hash.len(), HASH_HEX_SIZE);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn block_hash_consistency() {
        let block = fixed_block();
        assert_eq!(block.hash(), block.clone().hash());
        assert_eq!(hash(&block), block.hash());
    }

    #[test]
    fn block_hash_ignores_field_order() {
        let a: Block = serde_json::from_str(
            r#"{"index":1,"timestamp":"2024-01-01 00:00:00.000000","proof":1,"previous_hash":"0"}"#,
        )
        .unwrap();
        let b: Block = serde_json::from_str(
            r#"{"previous_hash":"0","proof":1,"timestamp":"2024-01-01 00:00:00.000000","index":1}"#,
        )
        .unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash(), fixed_block().hash());
    }

    #[test]
    fn block_hash_changes_with_each_field() {
        let base = fixed_block();
        let original = base.hash();

        let mut b = base.clone();
        b.index += 1;
        assert_ne!(b.hash(), original);

        let mut b = base.clone();
        b.timestamp.push('1');
        assert_ne!(b.hash(), original);

        let mut b = base.clone();
        b.proof += 1;
        assert_ne!(b.hash(), original);

        let mut b = base;
        b.previous_hash = "1".into();
        assert_ne!(b.hash(), original);
    }

    #[test]
    fn block_serialization_has_exactly_four_fields() {
        let json = serde_json::to_value(fixed_block()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        for key in ["index", "timestamp", "proof", "previous_hash"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn timestamp_has_microsecond_precision() {
        let ts = timestamp_now();
        // 2024-01-01 00:00:00.000000
        assert_eq!(ts.len(), 26);
        assert_eq!(&ts[10..11], " ");
        assert_eq!(&ts[19..20], ".");
    }
}
