use bustap_config::ConfigError;
use bustap_core::CaptureError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl CliError {
    /// Usage errors never get here; clap exits with 2 on its own.
    pub fn exit_code(&self) -> u8 {
        1
    }
}
