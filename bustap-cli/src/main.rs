//! ## bustap
//! Records all traffic on a D-Bus bus into a pcap file until told to stop.
//!
//! Exit status: 0 after a clean shutdown, 1 on a setup or capture failure,
//! 2 on a usage error.

use std::process::ExitCode;

use clap::Parser;

mod commands;
mod error;

use commands::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match commands::run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("bustap: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
