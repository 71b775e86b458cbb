//! Storage key derivation for the legacy OVM_ETH contract.

use ethereum_types::{Address, H256};
use sha3::{Digest, Keccak256};

use crate::constants::{ALLOWANCES_SLOT, BALANCES_SLOT, IGNORED_SLOTS};

pub fn keccak(data: impl AsRef<[u8]>) -> H256 {
    H256(Keccak256::digest(data.as_ref()).into())
}

/// Hashed form of a storage slot, i.e. the key the slot is iterated under.
pub fn hash_key(key: &H256) -> H256 {
    keccak(key.as_bytes())
}

fn address_word(address: &Address) -> H256 {
    H256::from(*address)
}

fn mapping_key(key: &H256, slot: &H256) -> H256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(key.as_bytes());
    preimage[32..].copy_from_slice(slot.as_bytes());
    keccak(preimage)
}

/// Slot holding the OVM_ETH balance of `address`.
pub fn balance_storage_key(address: &Address) -> H256 {
    mapping_key(&address_word(address), &BALANCES_SLOT)
}

/// Slot holding the allowance `from` granted to `to`.
pub fn allowance_storage_key(from: &Address, to: &Address) -> H256 {
    let inner = mapping_key(&address_word(from), &ALLOWANCES_SLOT);
    mapping_key(&address_word(to), &inner)
}

pub fn is_ignored_slot(key: &H256) -> bool {
    IGNORED_SLOTS.contains(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TOTAL_SUPPLY_SLOT;
    use hex_literal::hex;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            keccak([0u8; 0]),
            H256(hex!(
                "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
            ))
        );
    }

    #[test]
    fn balance_key_of_zero_address_hashes_two_zero_words() {
        assert_eq!(balance_storage_key(&Address::zero()), keccak([0u8; 64]));
    }

    #[test]
    fn allowance_key_depends_on_direction() {
        let a = Address::from_low_u64_be(0x123);
        let b = Address::from_low_u64_be(0x456);
        assert_ne!(allowance_storage_key(&a, &b), allowance_storage_key(&b, &a));
        assert_ne!(allowance_storage_key(&a, &b), balance_storage_key(&a));
    }

    #[test]
    fn metadata_slots_are_ignored() {
        assert!(is_ignored_slot(&TOTAL_SUPPLY_SLOT));
        assert!(is_ignored_slot(&H256::from_low_u64_be(6)));
        assert!(!is_ignored_slot(&H256::from_low_u64_be(7)));
        assert!(!is_ignored_slot(&balance_storage_key(&Address::zero())));
    }
}
