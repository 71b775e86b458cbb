//! Per-network parameters used to check the migration.

use std::{collections::BTreeMap, path::Path};

use ethereum_types::U256;
use serde::{Deserialize, Serialize};

use crate::{api::StateError, error::MigrationError};

/// Chain id of the local development network.
pub const DEVNET_CHAIN_ID: u64 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Amount by which the recorded total supply is expected to exceed the migrated total.
    pub expected_supply_delta: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParamsRegistry {
    params: BTreeMap<u64, ChainParams>,
}

impl Default for ChainParamsRegistry {
    fn default() -> Self {
        let mut params = BTreeMap::new();
        params.insert(
            DEVNET_CHAIN_ID,
            ChainParams {
                expected_supply_delta: U256::zero(),
            },
        );
        Self { params }
    }
}

impl ChainParamsRegistry {
    /// Registry without any entry.
    pub fn empty() -> Self {
        Self {
            params: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, chain_id: u64, params: ChainParams) -> Option<ChainParams> {
        self.params.insert(chain_id, params)
    }

    /// Adds or overrides entries from a JSON object keyed by chain id, e.g.
    /// `{ "10": { "expected_supply_delta": "0x0" } }`.
    pub fn extend_from_json(&mut self, json: &str) -> Result<(), StateError> {
        let entries: BTreeMap<u64, ChainParams> = serde_json::from_str(json)?;
        self.params.extend(entries);
        Ok(())
    }

    pub fn extend_from_file(&mut self, path: &Path) -> Result<(), StateError> {
        let json = std::fs::read_to_string(path)?;
        self.extend_from_json(&json)
    }

    pub fn get(&self, chain_id: u64) -> Result<&ChainParams, MigrationError> {
        self.params
            .get(&chain_id)
            .ok_or(MigrationError::MissingChainParams(chain_id))
    }
}
