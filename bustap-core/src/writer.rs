//! The writer thread: sole consumer of the handoff queue and sole owner of
//! the capture sink until it is handed back at join.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bustap_telemetry::MetricsRecorder;
use tracing::{debug, error, info, trace};

use crate::error::CaptureError;
use crate::queue::{HandoffQueue, QueueItem};
use crate::record::Record;
use crate::shutdown::FatalReporter;

pub const WRITER_THREAD_NAME: &str = "bustap-writer";

/// Destination for captured records.
pub trait RecordSink: Send + 'static {
    /// Appends one record: header built from the record's timestamp and
    /// payload length, then the payload.
    fn append(&mut self, record: &Record) -> Result<(), CaptureError>;

    /// Flushes and releases the underlying file.
    fn close(self) -> Result<(), CaptureError>
    where
        Self: Sized;
}

/// Pops records in order and appends them until STOP. Returns the sink,
/// still open, and the number of records written.
pub fn drain<S: RecordSink>(
    queue: &HandoffQueue,
    mut sink: S,
    metrics: &MetricsRecorder,
) -> Result<(S, u64), CaptureError> {
    let mut written = 0u64;
    loop {
        match queue.pop() {
            QueueItem::Stop => break,
            QueueItem::Record(record) => {
                sink.append(&record)?;
                written += 1;
                metrics.record_written(record.len());
                trace!("Wrote record #{written}: {} bytes", record.len());
            }
        }
    }
    Ok((sink, written))
}

/// Joinable handle to the writer thread.
pub struct WriterHandle<S: RecordSink> {
    handle: JoinHandle<Option<(S, u64)>>,
}

impl<S: RecordSink> WriterHandle<S> {
    /// Starts the writer on a dedicated, named thread.
    ///
    /// A write failure is logged and reported through `fatal`; the thread
    /// then exits without touching the remaining queue.
    pub fn spawn(
        queue: HandoffQueue,
        sink: S,
        metrics: Arc<MetricsRecorder>,
        fatal: FatalReporter,
    ) -> Result<Self, CaptureError> {
        let handle = thread::Builder::new()
            .name(WRITER_THREAD_NAME.into())
            .spawn(move || {
                info!("Writer started");
                match drain(&queue, sink, &metrics) {
                    Ok((sink, written)) => {
                        debug!("Writer reached STOP after {written} records");
                        Some((sink, written))
                    }
                    Err(err) => {
                        error!("Writer failed: {err}");
                        fatal.report(err);
                        None
                    }
                }
            })
            .map_err(|e| CaptureError::setup("Couldn't spawn writer thread", e))?;

        Ok(Self { handle })
    }

    /// Waits for the writer to consume STOP. Returns the sink for closing
    /// and the record count.
    pub fn join(self) -> Result<(S, u64), CaptureError> {
        match self.handle.join() {
            Ok(Some(done)) => Ok(done),
            Ok(None) => Err(CaptureError::SinkWrite(
                "writer stopped after a failed write".into(),
            )),
            Err(_) => Err(CaptureError::WriterPanicked),
        }
    }
}
