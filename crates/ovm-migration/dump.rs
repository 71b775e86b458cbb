//! JSON state dump read and written by the migration tooling.
//!
//! ```json
//! {
//!   "accounts": {
//!     "0xdeaddeaddeaddeaddeaddeaddeaddeaddead0000": {
//!       "balance": "0x0",
//!       "storage": { "0x00..02": "0x00..03" }
//!     }
//!   }
//! }
//! ```

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    api::{StateError, StateWriter},
    backend::in_memory::InMemoryState,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDump {
    pub accounts: BTreeMap<Address, AccountDump>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDump {
    #[serde(default)]
    pub balance: U256,
    /// Storage keyed by slot (not hashed).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<H256, H256>,
}

impl StateDump {
    pub fn from_file(path: &Path) -> Result<Self, StateError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), StateError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Loads the dump into a fresh state, recording a preimage for every slot.
    pub fn into_state(self) -> Result<InMemoryState, StateError> {
        let mut state = InMemoryState::new();
        for (address, account) in self.accounts {
            if !account.balance.is_zero() {
                state.set_balance(address, account.balance)?;
            }
            for (slot, value) in account.storage {
                state.set_storage(address, slot, value)?;
            }
        }
        Ok(state)
    }

    /// Dumps `state`, leaving out accounts with neither balance nor storage.
    pub fn from_state(state: &InMemoryState) -> Result<Self, StateError> {
        let mut accounts = BTreeMap::new();
        for (address, account) in state.accounts() {
            if account.is_empty() {
                continue;
            }
            accounts.insert(
                *address,
                AccountDump {
                    balance: account.balance,
                    storage: state.storage_of(address)?,
                },
            );
        }
        Ok(Self { accounts })
    }
}
