use ethereum_types::{Address, H160, H256};
use hex_literal::hex;

/// Number of scan workers spawned over the legacy storage keyspace.
pub const CHECK_JOBS: usize = 64;

/// Number of received candidates between two progress log lines.
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Address of the legacy OVM_ETH ERC20 predeploy.
pub const LEGACY_ERC20_ETH_ADDRESS: Address =
    H160(hex!("deaddeaddeaddeaddeaddeaddeaddeaddead0000"));

/// Old OVM sequencer entrypoint. It received ETH long ago but no witness data covers it,
/// so it is always expected to hold a balance slot.
pub const SEQUENCER_ENTRYPOINT_ADDRESS: Address =
    H160(hex!("4200000000000000000000000000000000000005"));

/// Slot of the `_balances` mapping.
pub const BALANCES_SLOT: H256 = H256([0u8; 32]);

/// Slot of the `_allowances` mapping.
pub const ALLOWANCES_SLOT: H256 = H256(hex!(
    "0000000000000000000000000000000000000000000000000000000000000001"
));

/// Slot of `_totalSupply`.
pub const TOTAL_SUPPLY_SLOT: H256 = H256(hex!(
    "0000000000000000000000000000000000000000000000000000000000000002"
));

/// Contract metadata slots that hold no user data (total supply, name, symbol and the two
/// trailing predeploy words).
pub const IGNORED_SLOTS: [H256; 5] = [
    TOTAL_SUPPLY_SLOT,
    H256(hex!(
        "0000000000000000000000000000000000000000000000000000000000000003"
    )),
    H256(hex!(
        "0000000000000000000000000000000000000000000000000000000000000004"
    )),
    H256(hex!(
        "0000000000000000000000000000000000000000000000000000000000000005"
    )),
    H256(hex!(
        "0000000000000000000000000000000000000000000000000000000000000006"
    )),
];

/// Largest possible storage key.
pub const MAX_SLOT: H256 = H256([0xff; 32]);

/// Capacity of the channel between scan workers and the collector.
pub const CANDIDATE_BUFFER: usize = 1024;
