// Collaborator seams: the legacy snapshot the scan reads from and the state the migration
// writes into.

use std::fmt::Debug;

use ethereum_types::{Address, H256, U256};
use rlp::Rlp;

/// Storage entries of one contract as `(hashed key, raw value)` pairs, in ascending hashed-key
/// order.
pub type StorageIter<'a> = Box<dyn Iterator<Item = (H256, Vec<u8>)> + 'a>;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to decode stored value: {0}")]
    Decode(#[from] rlp::DecoderError),
    #[error("Stored value is {0} bytes long, expected at most 32")]
    OversizedValue(usize),
    #[error("Missing preimage for hashed slot {0:#x}")]
    MissingPreimage(H256),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read-only view over a state snapshot.
///
/// Every reader returned by a [`LegacyStateFactory`] is independent, so several of them can
/// iterate the same snapshot from different threads.
pub trait LegacyStateReader: Send {
    /// Returns the storage of `contract` starting at the hashed key `start` (inclusive).
    /// An account without storage yields an empty iterator.
    fn storage_iter_from(&self, contract: Address, start: H256)
    -> Result<StorageIter<'_>, StateError>;

    /// Recovers the slot a hashed storage key was derived from.
    fn preimage(&self, hashed_key: &H256) -> Result<Option<H256>, StateError>;

    fn balance(&self, address: Address) -> Result<U256, StateError>;

    /// Decoded value of `slot` in `contract`, zero when unset.
    fn storage_at(&self, contract: Address, slot: H256) -> Result<H256, StateError>;
}

pub trait LegacyStateFactory: Sync {
    type Reader: LegacyStateReader;

    fn open_reader(&self) -> Result<Self::Reader, StateError>;
}

/// Mutable state the migrated balances are written into. Writes are visible to subsequent
/// reads of the same store.
pub trait StateWriter: Debug + Send {
    fn set_balance(&mut self, address: Address, balance: U256) -> Result<(), StateError>;

    /// Writes `value` into `slot`. A zero value clears the slot.
    fn set_storage(&mut self, contract: Address, slot: H256, value: H256)
    -> Result<(), StateError>;
}

/// Decodes a raw stored value (an RLP byte string) into a left-padded word.
pub fn decode_storage_value(raw: &[u8]) -> Result<H256, StateError> {
    let content = Rlp::new(raw).data()?;
    if content.len() > 32 {
        return Err(StateError::OversizedValue(content.len()));
    }
    let mut word = H256::zero();
    word.as_bytes_mut()[32 - content.len()..].copy_from_slice(content);
    Ok(word)
}

/// Encodes a word the way it is stored: an RLP string with leading zeros stripped.
pub fn encode_storage_value(value: &H256) -> Vec<u8> {
    let start = value
        .as_bytes()
        .iter()
        .position(|byte| *byte != 0)
        .unwrap_or(32);
    rlp::encode(&value.as_bytes()[start..].to_vec()).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_short_values_left_padded() {
        let raw = encode_storage_value(&H256::from_low_u64_be(0x0102));
        assert_eq!(raw, vec![0x82, 0x01, 0x02]);
        assert_eq!(
            decode_storage_value(&raw).expect("valid value"),
            H256::from_low_u64_be(0x0102)
        );
    }

    #[test]
    fn single_small_byte_is_its_own_encoding() {
        let raw = encode_storage_value(&H256::from_low_u64_be(1));
        assert_eq!(raw, vec![0x01]);
        assert_eq!(
            decode_storage_value(&raw).expect("valid value"),
            H256::from_low_u64_be(1)
        );
    }

    #[test]
    fn rejects_values_longer_than_a_word() {
        let raw = rlp::encode(&vec![0xffu8; 33]).to_vec();
        assert!(matches!(
            decode_storage_value(&raw),
            Err(StateError::OversizedValue(33))
        ));
    }

    #[test]
    fn rejects_malformed_rlp() {
        assert!(matches!(
            decode_storage_value(&[0xb8]),
            Err(StateError::Decode(_))
        ));
    }
}
