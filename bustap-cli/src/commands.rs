use std::io::Read;
use std::path::PathBuf;
use std::thread;

use bustap_config::BustapConfig;
use bustap_engine::CaptureRuntime;
use bustap_telemetry::logging::EventLogger;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(version, about = "Capture D-Bus traffic to a pcap file")]
pub struct Cli {
    /// Capture file to create (truncated if it exists)
    pub output: PathBuf,

    /// Configuration file layered over config/bustap.yaml
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn run_command(cli: Cli) -> Result<(), CliError> {
    let config = BustapConfig::load(cli.config.as_deref())?;
    EventLogger::init(&config.telemetry.log_level);

    let cancel = CancellationToken::new();
    spawn_stop_triggers(cancel.clone());

    let runtime = CaptureRuntime::new(config);
    let summary = runtime.run(&cli.output, cancel).await?;
    info!(
        "Saved {} records to {}",
        summary.records_written,
        cli.output.display()
    );
    Ok(())
}

/// Cancels on the first byte (or EOF) on stdin, or on Ctrl-C.
fn spawn_stop_triggers(cancel: CancellationToken) {
    // A plain thread: a pending stdin read must not hold up runtime shutdown.
    let stdin_cancel = cancel.clone();
    let spawned = thread::Builder::new()
        .name("bustap-stdin".into())
        .spawn(move || {
            let mut byte = [0u8; 1];
            match std::io::stdin().read(&mut byte) {
                Ok(0) => debug!("stdin closed"),
                Ok(_) => debug!("Stop requested on stdin"),
                Err(e) => warn!("Reading stdin failed: {e}"),
            }
            stdin_cancel.cancel();
        });
    if let Err(e) = spawned {
        warn!("Couldn't watch stdin, only Ctrl-C will stop the capture: {e}");
    }

    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Interrupted"),
                    Err(e) => warn!("Couldn't listen for Ctrl-C: {e}"),
                }
                cancel.cancel();
            }
        }
    });
}
