use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use ethereum_types::{Address, H256, U256};

use crate::{
    api::{
        LegacyStateFactory, LegacyStateReader, StateError, StateWriter, StorageIter,
        decode_storage_value, encode_storage_value,
    },
    keys::hash_key,
};

/// In-memory account state.
///
/// Storage is kept under hashed slots, the same way a secure trie lays it out, and every
/// slot written is recorded in a preimage table so iteration keys can be mapped back.
#[derive(Debug, Default, Clone)]
pub struct InMemoryState {
    accounts: BTreeMap<Address, InMemoryAccount>,
    preimages: HashMap<H256, H256>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InMemoryAccount {
    pub balance: U256,
    /// Raw stored values keyed by hashed slot.
    storage: BTreeMap<H256, Vec<u8>>,
}

impl InMemoryAccount {
    pub fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.storage.is_empty()
    }
}

impl InMemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, address: &Address) -> U256 {
        self.accounts
            .get(address)
            .map(|account| account.balance)
            .unwrap_or_default()
    }

    pub fn storage_at(&self, contract: &Address, slot: &H256) -> Result<H256, StateError> {
        match self
            .accounts
            .get(contract)
            .and_then(|account| account.storage.get(&hash_key(slot)))
        {
            Some(raw) => decode_storage_value(raw),
            None => Ok(H256::zero()),
        }
    }

    /// Writes a raw value under an already hashed slot, bypassing the preimage table.
    pub fn set_raw_storage(&mut self, contract: Address, hashed_slot: H256, raw: Vec<u8>) {
        self.accounts
            .entry(contract)
            .or_default()
            .storage
            .insert(hashed_slot, raw);
    }

    pub fn remove_preimage(&mut self, hashed_slot: &H256) -> Option<H256> {
        self.preimages.remove(hashed_slot)
    }

    /// Decoded storage of `contract` keyed by slot. Fails if a slot has no preimage.
    pub fn storage_of(&self, contract: &Address) -> Result<BTreeMap<H256, H256>, StateError> {
        let Some(account) = self.accounts.get(contract) else {
            return Ok(BTreeMap::new());
        };
        account
            .storage
            .iter()
            .map(|(hashed, raw)| {
                let slot = self
                    .preimages
                    .get(hashed)
                    .copied()
                    .ok_or(StateError::MissingPreimage(*hashed))?;
                Ok((slot, decode_storage_value(raw)?))
            })
            .collect()
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &InMemoryAccount)> {
        self.accounts.iter()
    }

    /// Freezes the current state into a shareable read-only snapshot.
    pub fn snapshot(&self) -> InMemorySnapshot {
        InMemorySnapshot(Arc::new(self.clone()))
    }
}

impl StateWriter for InMemoryState {
    fn set_balance(&mut self, address: Address, balance: U256) -> Result<(), StateError> {
        self.accounts.entry(address).or_default().balance = balance;
        Ok(())
    }

    fn set_storage(
        &mut self,
        contract: Address,
        slot: H256,
        value: H256,
    ) -> Result<(), StateError> {
        let hashed = hash_key(&slot);
        self.preimages.insert(hashed, slot);
        let account = self.accounts.entry(contract).or_default();
        if value.is_zero() {
            account.storage.remove(&hashed);
        } else {
            account.storage.insert(hashed, encode_storage_value(&value));
        }
        Ok(())
    }
}

/// Read-only snapshot of an [`InMemoryState`]. Cloning is cheap and every clone is an
/// independent reader.
#[derive(Debug, Clone)]
pub struct InMemorySnapshot(Arc<InMemoryState>);

impl LegacyStateFactory for InMemorySnapshot {
    type Reader = InMemorySnapshot;

    fn open_reader(&self) -> Result<Self::Reader, StateError> {
        Ok(self.clone())
    }
}

impl LegacyStateReader for InMemorySnapshot {
    fn storage_iter_from(
        &self,
        contract: Address,
        start: H256,
    ) -> Result<StorageIter<'_>, StateError> {
        let Some(account) = self.0.accounts.get(&contract) else {
            return Ok(Box::new(std::iter::empty()));
        };
        Ok(Box::new(
            account
                .storage
                .range(start..)
                .map(|(hashed, raw)| (*hashed, raw.clone())),
        ))
    }

    fn preimage(&self, hashed_key: &H256) -> Result<Option<H256>, StateError> {
        Ok(self.0.preimages.get(hashed_key).copied())
    }

    fn balance(&self, address: Address) -> Result<U256, StateError> {
        Ok(self.0.balance(&address))
    }

    fn storage_at(&self, contract: Address, slot: H256) -> Result<H256, StateError> {
        self.0.storage_at(&contract, &slot)
    }
}
