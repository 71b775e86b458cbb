mod cli;

use crate::cli::{CLI, emit_error_report, init_tracing};
use clap::Parser;
use std::time::Instant;

fn main() {
    let started_at = Instant::now();
    let cli = CLI::parse();
    init_tracing(cli.log_level);

    if let Err(error) = cli.run(started_at) {
        emit_error_report(cli.json, started_at, &error);
        std::process::exit(1);
    }
}
