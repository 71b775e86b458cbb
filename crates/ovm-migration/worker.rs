use std::sync::mpsc::SyncSender;

use ethereum_types::{Address, BigEndianHash, H256, U256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    api::{LegacyStateFactory, LegacyStateReader, decode_storage_value},
    constants::LEGACY_ERC20_ETH_ADDRESS,
    error::MigrationError,
    expectation::{ExpectationIndex, SlotKind},
    keys::is_ignored_slot,
    partition::KeyRange,
};

/// A validated legacy balance on its way to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationCandidate {
    pub address: Address,
    pub balance: U256,
    /// Slot the balance was read from, cleared once migrated.
    pub legacy_slot: H256,
}

/// Messages sent from scan workers to the collector.
#[derive(Debug)]
pub enum WorkerMessage {
    Candidate(MigrationCandidate),
    Fatal(MigrationError),
}

/// Scans one partition of the legacy contract storage.
pub struct ScanWorker<'a, F> {
    pub id: usize,
    pub factory: &'a F,
    pub index: &'a ExpectationIndex,
    pub cancel: &'a CancellationToken,
    pub no_check: bool,
}

impl<F: LegacyStateFactory> ScanWorker<'_, F> {
    /// Scans `range`, sending candidates to `sender`. A fatal error is forwarded to the
    /// collector instead of being returned.
    pub fn run(self, range: KeyRange, sender: SyncSender<WorkerMessage>) {
        if let Err(err) = self.scan(range, &sender) {
            debug!(worker = self.id, %err, "Scan worker stopped on error");
            // The collector only hangs up once every sender is gone, so this can't fail
            // while it is still listening.
            let _ = sender.send(WorkerMessage::Fatal(err));
        }
    }

    fn scan(
        &self,
        range: KeyRange,
        sender: &SyncSender<WorkerMessage>,
    ) -> Result<(), MigrationError> {
        // Each worker opens its own reader so iteration never shares state with another thread.
        let reader = self.factory.open_reader()?;
        let entries = reader.storage_iter_from(LEGACY_ERC20_ETH_ADDRESS, range.start)?;

        for (hashed_key, raw_value) in entries {
            if self.cancel.is_cancelled() {
                debug!(worker = self.id, "Scan worker cancelled");
                return Ok(());
            }

            // Bounds are checked on the hashed key, the order the store iterates in. The
            // range is inclusive; a boundary key also seen by the next worker is dropped by
            // the collector.
            if hashed_key > range.end {
                break;
            }

            if raw_value.is_empty() {
                continue;
            }

            let key = reader
                .preimage(&hashed_key)?
                .ok_or(MigrationError::MissingPreimage(hashed_key))?;

            let value = decode_storage_value(&raw_value)
                .map_err(|source| MigrationError::MalformedValue { key, source })?;

            if is_ignored_slot(&key) {
                continue;
            }

            let Some(slot) = self.index.get(&key) else {
                if self.no_check {
                    warn!(slot = %format!("{key:#x}"), "Ignoring unknown storage slot in state");
                    continue;
                }
                return Err(MigrationError::UnknownStorageSlot(key));
            };

            match slot.kind {
                // Allowances carry no value.
                SlotKind::Allowance => continue,
                SlotKind::Balance => {
                    self.check_empty_account(&reader, slot.owner)?;
                    let candidate = MigrationCandidate {
                        address: slot.owner,
                        balance: value.into_uint(),
                        legacy_slot: key,
                    };
                    if sender.send(WorkerMessage::Candidate(candidate)).is_err() {
                        debug!(worker = self.id, "Collector hung up");
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }

    /// No account should hold native balance before migration.
    fn check_empty_account(
        &self,
        reader: &F::Reader,
        address: Address,
    ) -> Result<(), MigrationError> {
        let balance = reader.balance(address)?;
        if balance.is_zero() {
            return Ok(());
        }
        error!(
            addr = %format!("{address:#x}"),
            %balance,
            "Account has non-zero balance in state - should never happen"
        );
        if self.no_check {
            return Ok(());
        }
        Err(MigrationError::NonZeroBalance { address, balance })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::sync_channel;

    use super::*;
    use crate::{
        api::StateWriter,
        backend::in_memory::InMemoryState,
        constants::TOTAL_SUPPLY_SLOT,
        expectation::Allowance,
        keys::{allowance_storage_key, balance_storage_key, hash_key},
        partition::partition_keyspace,
    };

    fn scan(state: &InMemoryState, index: &ExpectationIndex, no_check: bool) -> Vec<WorkerMessage> {
        let snapshot = state.snapshot();
        let cancel = CancellationToken::new();
        let (sender, receiver) = sync_channel(1024);
        ScanWorker {
            id: 0,
            factory: &snapshot,
            index,
            cancel: &cancel,
            no_check,
        }
        .run(partition_keyspace(0, 1), sender);
        receiver.into_iter().collect()
    }

    fn write_slot(state: &mut InMemoryState, slot: H256, value: u64) {
        state
            .set_storage(LEGACY_ERC20_ETH_ADDRESS, slot, H256::from_low_u64_be(value))
            .expect("in-memory write");
    }

    #[test]
    fn emits_balances_and_skips_allowances_and_metadata() {
        let a = Address::from_low_u64_be(0x123);
        let b = Address::from_low_u64_be(0x456);
        let mut state = InMemoryState::new();
        write_slot(&mut state, TOTAL_SUPPLY_SLOT, 3);
        write_slot(&mut state, balance_storage_key(&a), 1);
        write_slot(&mut state, balance_storage_key(&b), 2);
        write_slot(&mut state, allowance_storage_key(&a, &b), 1);

        let index = ExpectationIndex::build(&[a, b], &[Allowance { from: a, to: b }]);
        let mut candidates: Vec<MigrationCandidate> = scan(&state, &index, false)
            .into_iter()
            .map(|message| match message {
                WorkerMessage::Candidate(candidate) => candidate,
                WorkerMessage::Fatal(err) => panic!("unexpected error: {err}"),
            })
            .collect();
        candidates.sort_by_key(|candidate| candidate.address);

        assert_eq!(
            candidates,
            vec![
                MigrationCandidate {
                    address: a,
                    balance: U256::from(1),
                    legacy_slot: balance_storage_key(&a),
                },
                MigrationCandidate {
                    address: b,
                    balance: U256::from(2),
                    legacy_slot: balance_storage_key(&b),
                },
            ]
        );
    }

    #[test]
    fn unknown_slot_is_fatal_in_strict_mode() {
        let a = Address::from_low_u64_be(0x123);
        let mut state = InMemoryState::new();
        write_slot(&mut state, balance_storage_key(&a), 1);

        let messages = scan(&state, &ExpectationIndex::build(&[], &[]), false);
        assert!(matches!(
            messages.as_slice(),
            [WorkerMessage::Fatal(MigrationError::UnknownStorageSlot(key))] if *key == balance_storage_key(&a)
        ));
    }

    #[test]
    fn unknown_slot_is_skipped_in_relaxed_mode() {
        let a = Address::from_low_u64_be(0x123);
        let mut state = InMemoryState::new();
        write_slot(&mut state, balance_storage_key(&a), 1);

        assert!(scan(&state, &ExpectationIndex::build(&[], &[]), true).is_empty());
    }

    #[test]
    fn funded_account_is_fatal_in_strict_mode_and_migrated_in_relaxed_mode() {
        let a = Address::from_low_u64_be(0x123);
        let mut state = InMemoryState::new();
        write_slot(&mut state, balance_storage_key(&a), 1);
        state
            .set_balance(a, U256::from(7))
            .expect("in-memory write");
        let index = ExpectationIndex::build(&[a], &[]);

        assert!(matches!(
            scan(&state, &index, false).as_slice(),
            [WorkerMessage::Fatal(MigrationError::NonZeroBalance { address, .. })] if *address == a
        ));
        assert!(matches!(
            scan(&state, &index, true).as_slice(),
            [WorkerMessage::Candidate(candidate)] if candidate.balance == U256::from(1)
        ));
    }

    #[test]
    fn missing_preimage_is_fatal_even_in_relaxed_mode() {
        let a = Address::from_low_u64_be(0x123);
        let mut state = InMemoryState::new();
        write_slot(&mut state, balance_storage_key(&a), 1);
        state.remove_preimage(&hash_key(&balance_storage_key(&a)));

        assert!(matches!(
            scan(&state, &ExpectationIndex::build(&[a], &[]), true).as_slice(),
            [WorkerMessage::Fatal(MigrationError::MissingPreimage(_))]
        ));
    }

    #[test]
    fn cancelled_worker_emits_nothing() {
        let a = Address::from_low_u64_be(0x123);
        let mut state = InMemoryState::new();
        write_slot(&mut state, balance_storage_key(&a), 1);
        let snapshot = state.snapshot();
        let index = ExpectationIndex::build(&[a], &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (sender, receiver) = sync_channel(16);

        ScanWorker {
            id: 0,
            factory: &snapshot,
            index: &index,
            cancel: &cancel,
            no_check: false,
        }
        .run(partition_keyspace(0, 1), sender);

        assert_eq!(receiver.into_iter().count(), 0);
    }
}
