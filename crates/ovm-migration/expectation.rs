//! Index of every storage slot the scan knows how to explain.

use ethereum_types::{Address, H256};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    constants::SEQUENCER_ENTRYPOINT_ADDRESS,
    keys::{allowance_storage_key, balance_storage_key},
};

/// An allowance granted by `from` to `to` in the legacy contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Allowance {
    pub from: Address,
    pub to: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Balance,
    Allowance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedSlot {
    pub owner: Address,
    pub kind: SlotKind,
}

/// Maps a derived storage slot to the account that owns it. Built once before scanning and
/// only read afterwards.
#[derive(Debug, Default)]
pub struct ExpectationIndex {
    slots: FxHashMap<H256, ExpectedSlot>,
}

impl ExpectationIndex {
    /// Builds the index from the witnessed addresses and allowances.
    ///
    /// Mint events are recorded as regular transfers in the witness data, so addresses and
    /// allowances are all there is. The sequencer entrypoint is added unconditionally.
    pub fn build(addresses: &[Address], allowances: &[Allowance]) -> Self {
        let mut index = Self {
            slots: FxHashMap::with_capacity_and_hasher(
                addresses.len() + allowances.len() + 1,
                Default::default(),
            ),
        };

        for address in addresses {
            index.insert(
                balance_storage_key(address),
                ExpectedSlot {
                    owner: *address,
                    kind: SlotKind::Balance,
                },
            );
        }

        for allowance in allowances {
            index.insert(
                allowance_storage_key(&allowance.from, &allowance.to),
                ExpectedSlot {
                    owner: allowance.from,
                    kind: SlotKind::Allowance,
                },
            );
        }

        index.insert(
            balance_storage_key(&SEQUENCER_ENTRYPOINT_ADDRESS),
            ExpectedSlot {
                owner: SEQUENCER_ENTRYPOINT_ADDRESS,
                kind: SlotKind::Balance,
            },
        );

        index
    }

    fn insert(&mut self, key: H256, slot: ExpectedSlot) {
        if let Some(previous) = self.slots.insert(key, slot)
            && previous != slot
        {
            warn!(
                key = %format!("{key:#x}"),
                ?previous,
                ?slot,
                "Storage key derived for two different entries"
            );
        }
    }

    pub fn get(&self, key: &H256) -> Option<&ExpectedSlot> {
        self.slots.get(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
