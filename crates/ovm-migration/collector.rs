use std::sync::mpsc::Receiver;

use ethereum_types::{Address, H256, U256};
use rustc_hash::FxHashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    api::StateWriter,
    constants::LEGACY_ERC20_ETH_ADDRESS,
    error::MigrationError,
    progress::ProgressLogger,
    worker::{MigrationCandidate, WorkerMessage},
};

/// What the collector accumulated over a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorOutcome {
    /// Accounts whose balance was written.
    pub migrated: u64,
    /// Candidates dropped because their address was already migrated.
    pub duplicates: u64,
    pub total_migrated: U256,
}

/// Single writer of the migration. Applies candidates as they arrive from any worker and
/// turns the first fatal error into the cancellation signal.
#[derive(Debug)]
pub struct Collector<'a, W> {
    target: &'a mut W,
    cancel: CancellationToken,
    seen: FxHashSet<Address>,
    total_migrated: U256,
    migrated: u64,
    duplicates: u64,
    progress: ProgressLogger,
    first_error: Option<MigrationError>,
}

impl<'a, W: StateWriter> Collector<'a, W> {
    pub fn new(target: &'a mut W, cancel: CancellationToken, progress_interval: u64) -> Self {
        Self {
            target,
            cancel,
            seen: FxHashSet::default(),
            total_migrated: U256::zero(),
            migrated: 0,
            duplicates: 0,
            progress: ProgressLogger::new(progress_interval, "Migrated OVM_ETH storage slot"),
            first_error: None,
        }
    }

    /// Consumes messages until every sender is gone. Once cancelled, remaining candidates are
    /// drained without being applied.
    pub fn run(
        mut self,
        receiver: Receiver<WorkerMessage>,
    ) -> Result<CollectorOutcome, MigrationError> {
        for message in receiver {
            match message {
                WorkerMessage::Candidate(candidate) => {
                    if self.cancel.is_cancelled() {
                        continue;
                    }
                    if let Err(err) = self.apply(candidate) {
                        self.fail(err);
                    }
                }
                WorkerMessage::Fatal(err) => self.fail(err),
            }
        }

        match self.first_error {
            Some(err) => Err(err),
            None => Ok(CollectorOutcome {
                migrated: self.migrated,
                duplicates: self.duplicates,
                total_migrated: self.total_migrated,
            }),
        }
    }

    fn apply(&mut self, candidate: MigrationCandidate) -> Result<(), MigrationError> {
        self.progress.tick();

        // Adjacent partitions share a boundary key, so the same account can show up twice.
        if self.seen.contains(&candidate.address) {
            info!(
                addr = %format!("{:#x}", candidate.address),
                "Skipping duplicate account during iteration"
            );
            self.duplicates += 1;
            return Ok(());
        }

        self.total_migrated = self
            .total_migrated
            .checked_add(candidate.balance)
            .ok_or(MigrationError::MigratedTotalOverflow(candidate.address))?;

        self.target.set_balance(candidate.address, candidate.balance)?;
        self.target.set_storage(
            LEGACY_ERC20_ETH_ADDRESS,
            candidate.legacy_slot,
            H256::zero(),
        )?;
        self.seen.insert(candidate.address);
        self.migrated += 1;
        Ok(())
    }

    /// First error wins; later ones are only logged.
    fn fail(&mut self, err: MigrationError) {
        if self.first_error.is_some() {
            debug!(%err, "Dropping error raised after cancellation");
            return;
        }
        self.first_error = Some(err);
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::sync_channel;

    use super::*;
    use crate::{backend::in_memory::InMemoryState, keys::balance_storage_key};

    fn candidate(address: Address, balance: u64) -> MigrationCandidate {
        MigrationCandidate {
            address,
            balance: U256::from(balance),
            legacy_slot: balance_storage_key(&address),
        }
    }

    fn collect(
        state: &mut InMemoryState,
        cancel: CancellationToken,
        messages: Vec<WorkerMessage>,
    ) -> Result<CollectorOutcome, MigrationError> {
        let (sender, receiver) = sync_channel(messages.len().max(1));
        for message in messages {
            sender.send(message).expect("receiver alive");
        }
        drop(sender);
        Collector::new(state, cancel, 1000).run(receiver)
    }

    #[test]
    fn applies_balances_and_clears_legacy_slots() {
        let a = Address::from_low_u64_be(0x123);
        let mut state = InMemoryState::new();
        state
            .set_storage(
                LEGACY_ERC20_ETH_ADDRESS,
                balance_storage_key(&a),
                H256::from_low_u64_be(5),
            )
            .expect("in-memory write");

        let outcome = collect(
            &mut state,
            CancellationToken::new(),
            vec![WorkerMessage::Candidate(candidate(a, 5))],
        )
        .expect("no errors");

        assert_eq!(outcome.migrated, 1);
        assert_eq!(outcome.total_migrated, U256::from(5));
        assert_eq!(state.balance(&a), U256::from(5));
        assert_eq!(
            state
                .storage_at(&LEGACY_ERC20_ETH_ADDRESS, &balance_storage_key(&a))
                .expect("readable"),
            H256::zero()
        );
    }

    #[test]
    fn duplicate_candidate_is_applied_once() {
        let a = Address::from_low_u64_be(0x123);
        let b = Address::from_low_u64_be(0x456);
        let mut state = InMemoryState::new();

        let outcome = collect(
            &mut state,
            CancellationToken::new(),
            vec![
                WorkerMessage::Candidate(candidate(a, 1)),
                WorkerMessage::Candidate(candidate(b, 2)),
                WorkerMessage::Candidate(candidate(a, 1)),
            ],
        )
        .expect("no errors");

        assert_eq!(
            outcome,
            CollectorOutcome {
                migrated: 2,
                duplicates: 1,
                total_migrated: U256::from(3),
            }
        );
        assert_eq!(state.balance(&a), U256::from(1));
    }

    #[test]
    fn first_error_wins_and_cancels() {
        let a = Address::from_low_u64_be(0x123);
        let mut state = InMemoryState::new();
        let cancel = CancellationToken::new();

        let err = collect(
            &mut state,
            cancel.clone(),
            vec![
                WorkerMessage::Fatal(MigrationError::UnknownStorageSlot(H256::repeat_byte(1))),
                WorkerMessage::Fatal(MigrationError::UnknownStorageSlot(H256::repeat_byte(2))),
                WorkerMessage::Candidate(candidate(a, 1)),
            ],
        )
        .expect_err("fatal error reported");

        assert!(cancel.is_cancelled());
        assert!(matches!(
            err,
            MigrationError::UnknownStorageSlot(key) if key == H256::repeat_byte(1)
        ));
        assert_eq!(state.balance(&a), U256::zero());
    }
}
