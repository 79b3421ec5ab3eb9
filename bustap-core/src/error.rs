use thiserror::Error;

/// Every failure the capture pipeline can hit. None of them are recoverable:
/// the binary reports the error and exits.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Couldn't marshal message: {0}")]
    Serialization(String),

    #[error("Couldn't write capture record: {0}")]
    SinkWrite(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Record pushed after the handoff queue was stopped")]
    QueueClosed,

    #[error("Writer thread panicked")]
    WriterPanicked,
}

impl CaptureError {
    pub fn setup(context: &str, err: impl std::fmt::Display) -> Self {
        CaptureError::Setup(format!("{context}: {err}"))
    }
}
