use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use clap::Parser as ClapParser;
use ethereum_types::Address;
use ethrex_ovm_migration::{
    Allowance, ChainParamsRegistry, MigrationError, MigrationOptions, MigrationSummary,
    StateError, SupplyVerification, constants::CHECK_JOBS, dump::StateDump, migrate_balances,
};
use eyre::{Result, WrapErr};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, filter::Directive};

const REPORT_SCHEMA_VERSION: u32 = 1;
const MAX_JOBS: i64 = 1024;

#[allow(clippy::upper_case_acronyms)]
#[derive(ClapParser)]
#[command(
    name = "ovm-eth-migrate",
    author = "Lambdaclass",
    about = "Migrate legacy OVM_ETH balances into native account balances"
)]
pub struct CLI {
    #[arg(
        long = "state",
        value_name = "STATE_DUMP",
        env = "OVM_MIGRATE_STATE",
        help_heading = "Input options"
    )]
    /// JSON dump of the pre-migration state
    pub state: PathBuf,
    #[arg(
        long = "addresses",
        value_name = "ADDRESSES_FILE",
        env = "OVM_MIGRATE_ADDRESSES",
        help_heading = "Input options"
    )]
    /// JSON array of every address that ever held OVM_ETH
    pub addresses: PathBuf,
    #[arg(
        long = "allowances",
        value_name = "ALLOWANCES_FILE",
        env = "OVM_MIGRATE_ALLOWANCES",
        help_heading = "Input options"
    )]
    /// JSON array of `{ "from", "to" }` allowance pairs
    pub allowances: Option<PathBuf>,
    #[arg(
        long = "chain-id",
        value_name = "CHAIN_ID",
        env = "OVM_MIGRATE_CHAIN_ID",
        help_heading = "Migration options"
    )]
    /// Network being migrated, used to look up its expected supply delta
    pub chain_id: u64,
    #[arg(
        long = "params",
        value_name = "PARAMS_FILE",
        env = "OVM_MIGRATE_PARAMS",
        help_heading = "Migration options"
    )]
    /// JSON object of per-network parameters, added to the built-in ones
    pub params: Option<PathBuf>,
    #[arg(
        long = "jobs",
        default_value_t = CHECK_JOBS as u16,
        value_parser = clap::value_parser!(u16).range(1..=MAX_JOBS),
        env = "OVM_MIGRATE_JOBS",
        help_heading = "Migration options"
    )]
    /// Number of parallel scan workers (1-1024, inclusive)
    pub jobs: u16,
    #[arg(
        long = "no-check",
        default_value_t = false,
        env = "OVM_MIGRATE_NO_CHECK",
        help_heading = "Migration options"
    )]
    /// Log unknown slots, funded accounts and supply mismatches instead of failing
    pub no_check: bool,
    #[arg(
        long = "output",
        value_name = "OUTPUT_DUMP",
        env = "OVM_MIGRATE_OUTPUT",
        help_heading = "Output options"
    )]
    /// Where to write the migrated state dump
    pub output: Option<PathBuf>,
    #[arg(
        long = "json",
        default_value_t = false,
        env = "OVM_MIGRATE_JSON",
        help_heading = "Output options"
    )]
    /// Emit machine-readable JSON output
    pub json: bool,
    #[arg(
        long = "log.level",
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        env = "OVM_MIGRATE_LOG_LEVEL",
        help = "The verbosity level used for logs.",
        long_help = "Possible values: info, debug, trace, warn, error",
        help_heading = "Output options"
    )]
    pub log_level: Level,
}

/// Logs go to stderr so stdout only carries the report.
pub fn init_tracing(log_level: Level) {
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from(log_level))
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .with_target(matches!(log_level, Level::DEBUG | Level::TRACE))
        .init();
}

#[derive(Serialize)]
struct MigrationReport {
    schema_version: u32,
    status: &'static str,
    chain_id: u64,
    jobs: u16,
    no_check: bool,
    migrated_accounts: u64,
    duplicates_skipped: u64,
    verification: SupplyVerification,
    output: Option<PathBuf>,
    elapsed_ms: u64,
}

#[derive(Serialize)]
struct MigrationErrorReport {
    schema_version: u32,
    status: &'static str,
    error_type: &'static str,
    error: String,
    elapsed_ms: u64,
}

fn elapsed_ms(started_at: Instant) -> u64 {
    started_at.elapsed().as_millis() as u64
}

/// Classification of a failed run. Anything that isn't a migration error happened while
/// reading or writing files.
fn classify_error(error: &eyre::Report) -> &'static str {
    match error.downcast_ref::<MigrationError>() {
        Some(migration_error) => migration_error.kind().as_str(),
        None => "collaborator",
    }
}

fn build_migration_error_report(
    error: &eyre::Report,
    started_at: Instant,
) -> MigrationErrorReport {
    MigrationErrorReport {
        schema_version: REPORT_SCHEMA_VERSION,
        status: "failed",
        error_type: classify_error(error),
        error: format!("{error:#}"),
        elapsed_ms: elapsed_ms(started_at),
    }
}

pub fn emit_error_report(json: bool, started_at: Instant, error: &eyre::Report) {
    if json {
        let report = build_migration_error_report(error, started_at);
        match serde_json::to_string(&report) {
            Ok(encoded) => println!("{encoded}"),
            Err(ser_error) => {
                eprintln!("Migration failed: {error:#}\nReport encoding failed: {ser_error}")
            }
        }
        return;
    }

    eprintln!(
        "Migration failed after {}ms ({}): {error:#}",
        elapsed_ms(started_at),
        classify_error(error)
    );
}

fn summary_lines(report: &MigrationReport) -> Vec<String> {
    let verification = &report.verification;
    let mut lines = vec![
        format!(
            "Migrated {} account(s) on chain {} ({} duplicate observation(s) skipped).",
            report.migrated_accounts, report.chain_id, report.duplicates_skipped
        ),
        format!(
            "Supply {} - migrated {} = {} (expected {}).",
            verification.total_supply,
            verification.migrated,
            verification.delta,
            verification.expected_delta
        ),
    ];
    if !verification.is_balanced() {
        lines.push("Supply check failed and was skipped due to --no-check.".to_string());
    }
    if let Some(output) = &report.output {
        lines.push(format!("Migrated state written to {}.", output.display()));
    }
    lines
}

fn emit_report(report: &MigrationReport, json: bool) -> Result<()> {
    if json {
        let encoded =
            serde_json::to_string(report).wrap_err("Cannot serialize migration report")?;
        println!("{encoded}");
        return Ok(());
    }

    for line in summary_lines(report) {
        println!("{line}");
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StateError> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

impl CLI {
    pub fn run(&self, started_at: Instant) -> Result<()> {
        let mut registry = ChainParamsRegistry::default();
        if let Some(params) = &self.params {
            registry
                .extend_from_file(params)
                .wrap_err_with(|| format!("Cannot read chain params {params:?}"))?;
        }

        let addresses: Vec<Address> = read_json(&self.addresses)
            .wrap_err_with(|| format!("Cannot read addresses {:?}", self.addresses))?;
        let allowances: Vec<Allowance> = match &self.allowances {
            Some(path) => {
                read_json(path).wrap_err_with(|| format!("Cannot read allowances {path:?}"))?
            }
            None => Vec::new(),
        };
        let mut state = StateDump::from_file(&self.state)
            .and_then(StateDump::into_state)
            .wrap_err_with(|| format!("Cannot load state dump {:?}", self.state))?;
        info!(
            addresses = addresses.len(),
            allowances = allowances.len(),
            "Loaded migration inputs"
        );

        let options = MigrationOptions {
            jobs: usize::from(self.jobs),
            no_check: self.no_check,
            ..Default::default()
        };
        let snapshot = state.snapshot();
        let MigrationSummary {
            migrated_accounts,
            duplicates_skipped,
            verification,
        } = migrate_balances(
            &mut state,
            &snapshot,
            &addresses,
            &allowances,
            self.chain_id,
            &registry,
            &options,
        )
        .wrap_err("OVM_ETH migration failed")?;

        if let Some(output) = &self.output {
            StateDump::from_state(&state)
                .and_then(|dump| dump.write_to_file(output))
                .wrap_err_with(|| format!("Cannot write migrated state {output:?}"))?;
        }

        let report = MigrationReport {
            schema_version: REPORT_SCHEMA_VERSION,
            status: "completed",
            chain_id: self.chain_id,
            jobs: self.jobs,
            no_check: self.no_check,
            migrated_accounts,
            duplicates_skipped,
            verification,
            output: self.output.clone(),
            elapsed_ms: elapsed_ms(started_at),
        };
        emit_report(&report, self.json)
    }
}
