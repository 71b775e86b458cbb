use ethereum_types::{Address, H256, U256};

use crate::{api::StateError, verify::SupplyDelta};

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("no chain params for {0}")]
    MissingChainParams(u64),
    #[error("unknown storage slot in state: {0:#x}")]
    UnknownStorageSlot(H256),
    #[error("account has non-zero balance in state - should never happen: {address:#x} ({balance})")]
    NonZeroBalance { address: Address, balance: U256 },
    #[error("supply mismatch: {delta} (expected {expected})")]
    SupplyMismatch { delta: SupplyDelta, expected: U256 },
    #[error("migrated total overflowed while adding balance of {0:#x}")]
    MigratedTotalOverflow(Address),
    #[error("cannot get preimage for storage key {0:#x}")]
    MissingPreimage(H256),
    #[error("mal-formed data in state at {key:#x}: {source}")]
    MalformedValue { key: H256, source: StateError },
    #[error("State error: {0}")]
    State(#[from] StateError),
    #[error("Failed to spawn {0} thread: {1}")]
    ThreadSpawn(&'static str, std::io::Error),
    #[error("{0} thread panicked")]
    ThreadPanicked(String),
}

/// Classes of failure a migration run can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The run could not be configured; nothing was scanned.
    Configuration,
    /// A legacy entry matched no known address or allowance.
    Classification,
    /// An account expected to be empty already held a balance.
    Integrity,
    /// Migrated total and recorded supply disagree.
    Conservation,
    /// A collaborator broke its contract (unreadable store, missing preimage, bad data).
    Collaborator,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Classification => "classification",
            Self::Integrity => "integrity",
            Self::Conservation => "conservation",
            Self::Collaborator => "collaborator",
        }
    }
}

impl MigrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingChainParams(_) => ErrorKind::Configuration,
            Self::UnknownStorageSlot(_) => ErrorKind::Classification,
            Self::NonZeroBalance { .. } => ErrorKind::Integrity,
            Self::SupplyMismatch { .. } | Self::MigratedTotalOverflow(_) => {
                ErrorKind::Conservation
            }
            Self::MissingPreimage(_)
            | Self::MalformedValue { .. }
            | Self::State(_)
            | Self::ThreadSpawn(..)
            | Self::ThreadPanicked(_) => ErrorKind::Collaborator,
        }
    }
}
