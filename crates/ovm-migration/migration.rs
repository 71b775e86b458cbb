//! # ethrex OVM_ETH migration
//!
//! Moves the balances recorded in the legacy OVM_ETH ERC20 predeploy into native account
//! balances, and proves nothing was lost or created on the way.
//!
//! ## Overview
//!
//! ```text
//! 1. Build the expectation index from the witnessed addresses and allowances
//! 2. Split the hashed storage keyspace into `jobs` inclusive partitions
//! 3. Scan every partition in parallel, classifying each non-empty slot
//! 4. Apply balance candidates through a single collector (dedup, sum, write, clear)
//! 5. Check recorded supply - migrated total == expected delta for the network
//! 6. Zero the legacy total supply
//! ```
//!
//! The first fatal error raised by any worker cancels every other worker and is the result
//! of the run. With `no_check` set, unknown slots, funded accounts and supply mismatches are
//! logged instead.
//!
//! ## Usage
//!
//! ```ignore
//! let snapshot = state.snapshot();
//! let summary = migrate_balances(
//!     &mut state,
//!     &snapshot,
//!     &addresses,
//!     &allowances,
//!     chain_id,
//!     &ChainParamsRegistry::default(),
//!     &MigrationOptions::default(),
//! )?;
//! ```

pub mod api;
pub mod backend;
pub mod collector;
pub mod constants;
pub mod dump;
pub mod error;
pub mod expectation;
pub mod keys;
pub mod params;
pub mod partition;
pub mod progress;
pub mod verify;
pub mod worker;

use std::{fmt, sync::mpsc::sync_channel};

use ethereum_types::{Address, BigEndianHash, H256, U256};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use api::{LegacyStateFactory, LegacyStateReader, StateError, StateWriter};
pub use error::{ErrorKind, MigrationError};
pub use expectation::Allowance;
pub use params::{ChainParams, ChainParamsRegistry};
pub use verify::{SupplyDelta, SupplyVerification};

use collector::{Collector, CollectorOutcome};
use constants::{
    CANDIDATE_BUFFER, CHECK_JOBS, LEGACY_ERC20_ETH_ADDRESS, PROGRESS_INTERVAL, TOTAL_SUPPLY_SLOT,
};
use expectation::ExpectationIndex;
use partition::split_keyspace;
use worker::{ScanWorker, WorkerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Number of parallel scan workers.
    ///
    /// A migration run panics if this is zero.
    pub jobs: usize,
    /// Log classification, integrity and conservation problems instead of failing.
    pub no_check: bool,
    /// Candidates between two progress lines.
    pub progress_interval: u64,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            jobs: CHECK_JOBS,
            no_check: false,
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub migrated_accounts: u64,
    pub duplicates_skipped: u64,
    pub verification: SupplyVerification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Initializing,
    Scanning,
    /// Every worker has exited; the collector applies what is left in the channel.
    Draining,
    Verifying,
    Completed,
    Failed,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Initializing => "initializing",
            Self::Scanning => "scanning",
            Self::Draining => "draining",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(phase)
    }
}

fn enter_phase(phase: MigrationPhase) {
    info!(%phase, "OVM_ETH migration phase");
}

/// Migrates all balances of the legacy OVM_ETH contract into native balances, using the
/// expected supply delta registered for `chain_id`.
///
/// `factory` must serve the pre-migration snapshot; `target` receives the writes.
pub fn migrate_balances<F, W>(
    target: &mut W,
    factory: &F,
    addresses: &[Address],
    allowances: &[Allowance],
    chain_id: u64,
    registry: &ChainParamsRegistry,
    options: &MigrationOptions,
) -> Result<MigrationSummary, MigrationError>
where
    F: LegacyStateFactory,
    W: StateWriter,
{
    let params = registry.get(chain_id)?;
    do_migration(
        target,
        factory,
        addresses,
        allowances,
        params.expected_supply_delta,
        options,
    )
}

/// Runs the migration against an explicit expected supply delta.
///
/// # Panics
///
/// Panics if `options.jobs` is zero.
pub fn do_migration<F, W>(
    target: &mut W,
    factory: &F,
    addresses: &[Address],
    allowances: &[Allowance],
    expected_delta: U256,
    options: &MigrationOptions,
) -> Result<MigrationSummary, MigrationError>
where
    F: LegacyStateFactory,
    W: StateWriter,
{
    let result = run_phases(
        target,
        factory,
        addresses,
        allowances,
        expected_delta,
        options,
    );
    match &result {
        Ok(_) => enter_phase(MigrationPhase::Completed),
        Err(err) => {
            error!(%err, kind = err.kind().as_str(), "OVM_ETH migration failed");
            enter_phase(MigrationPhase::Failed);
        }
    }
    result
}

fn run_phases<F, W>(
    target: &mut W,
    factory: &F,
    addresses: &[Address],
    allowances: &[Allowance],
    expected_delta: U256,
    options: &MigrationOptions,
) -> Result<MigrationSummary, MigrationError>
where
    F: LegacyStateFactory,
    W: StateWriter,
{
    enter_phase(MigrationPhase::Initializing);
    let index = ExpectationIndex::build(addresses, allowances);
    info!(
        expected_slots = index.len(),
        jobs = options.jobs,
        no_check = options.no_check,
        "Built OVM_ETH expectation index"
    );

    let outcome = scan_and_collect(target, factory, &index, options)?;
    info!(
        count = outcome.migrated,
        duplicates = outcome.duplicates,
        "Iterated legacy balances"
    );

    enter_phase(MigrationPhase::Verifying);
    let verification = verify_supply(
        factory,
        outcome.total_migrated,
        expected_delta,
        options.no_check,
    )?;

    // Balances no longer live in the contract, so its total supply can't be kept consistent
    // with them. Zero it so the mismatch is explicit.
    target.set_storage(LEGACY_ERC20_ETH_ADDRESS, TOTAL_SUPPLY_SLOT, H256::zero())?;
    info!("Set the totalSupply to 0");

    Ok(MigrationSummary {
        migrated_accounts: outcome.migrated,
        duplicates_skipped: outcome.duplicates,
        verification,
    })
}

/// Scans every partition in parallel and feeds the results to the collector, which is the
/// only writer to `target` while workers run.
fn scan_and_collect<F, W>(
    target: &mut W,
    factory: &F,
    index: &ExpectationIndex,
    options: &MigrationOptions,
) -> Result<CollectorOutcome, MigrationError>
where
    F: LegacyStateFactory,
    W: StateWriter,
{
    // Every range is computed up front so an invalid job count fails before anything runs.
    let ranges = split_keyspace(options.jobs);
    let cancel = CancellationToken::new();
    let (sender, receiver) = sync_channel::<WorkerMessage>(CANDIDATE_BUFFER);
    let progress_interval = options.progress_interval;

    std::thread::scope(|s| -> Result<CollectorOutcome, MigrationError> {
        let collector_cancel = cancel.clone();
        let collector = std::thread::Builder::new()
            .name("ovm_eth_collector".to_string())
            .spawn_scoped(s, move || {
                Collector::new(target, collector_cancel, progress_interval).run(receiver)
            })
            .map_err(|e| MigrationError::ThreadSpawn("collector", e))?;

        enter_phase(MigrationPhase::Scanning);
        let mut workers = Vec::with_capacity(ranges.len());
        for (id, range) in ranges.into_iter().enumerate() {
            let worker = ScanWorker {
                id,
                factory,
                index,
                cancel: &cancel,
                no_check: options.no_check,
            };
            let worker_sender = sender.clone();
            let handle = std::thread::Builder::new()
                .name(format!("ovm_eth_scan_{id}"))
                .spawn_scoped(s, move || worker.run(range, worker_sender))
                .map_err(|e| {
                    // Stop the workers already running; the collector exits once they do.
                    cancel.cancel();
                    MigrationError::ThreadSpawn("scan worker", e)
                })?;
            workers.push(handle);
        }

        for handle in workers {
            let name = handle.thread().name().unwrap_or("scan worker").to_string();
            if handle.join().is_err() {
                // Lost work can't be accounted for; fail the run like any other worker error.
                let _ = sender.send(WorkerMessage::Fatal(MigrationError::ThreadPanicked(name)));
            }
        }

        drop(sender);
        enter_phase(MigrationPhase::Draining);
        info!("Scan workers exited, waiting for the collector");
        collector
            .join()
            .map_err(|_| MigrationError::ThreadPanicked("ovm_eth_collector".to_string()))?
    })
}

fn verify_supply<F: LegacyStateFactory>(
    factory: &F,
    migrated: U256,
    expected_delta: U256,
    no_check: bool,
) -> Result<SupplyVerification, MigrationError> {
    let reader = factory.open_reader()?;
    let total_supply = reader
        .storage_at(LEGACY_ERC20_ETH_ADDRESS, TOTAL_SUPPLY_SLOT)?
        .into_uint();
    let verification = SupplyVerification::new(total_supply, migrated, expected_delta);

    if !verification.is_balanced() {
        error!(
            migrated = %verification.migrated,
            supply = %verification.total_supply,
            delta = %verification.delta,
            exp_delta = %verification.expected_delta,
            "Supply mismatch"
        );
        if !no_check {
            return Err(MigrationError::SupplyMismatch {
                delta: verification.delta,
                expected: expected_delta,
            });
        }
        return Ok(verification);
    }

    info!(
        migrated = %verification.migrated,
        supply = %verification.total_supply,
        delta = %verification.delta,
        exp_delta = %verification.expected_delta,
        "Supply verified OK"
    );
    Ok(verification)
}
