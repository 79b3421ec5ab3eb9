//! Shutdown coordination.
//!
//! `RUNNING -> STOPPING -> DRAINING -> CLOSED`. The interceptor is detached
//! and the connection closed before STOP is pushed, so no record can land
//! behind the sentinel. The capture file is closed only after the writer
//! has been joined, on the fatal path as well.

use std::fmt;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::bus::{BusConnection, FilterId};
use crate::error::CaptureError;
use crate::queue::HandoffQueue;
use crate::writer::{RecordSink, WriterHandle};

/// Reports a fatal error from outside the coordinator's task: the bus
/// dispatch task or the writer thread.
#[derive(Clone, Debug)]
pub struct FatalReporter(UnboundedSender<CaptureError>);

impl FatalReporter {
    pub fn report(&self, err: CaptureError) {
        // The coordinator holds the receiver for the whole session.
        let _ = self.0.send(err);
    }
}

pub struct FatalReceiver {
    rx: UnboundedReceiver<CaptureError>,
    // Keeps the channel open when every reporter is gone.
    _keepalive: UnboundedSender<CaptureError>,
}

impl FatalReceiver {
    pub async fn recv(&mut self) -> Option<CaptureError> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<CaptureError> {
        self.rx.try_recv().ok()
    }
}

pub fn fatal_channel() -> (FatalReporter, FatalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        FatalReporter(tx.clone()),
        FatalReceiver {
            rx,
            _keepalive: tx,
        },
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Stopping,
    Draining,
    Closed,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownState::Running => "RUNNING",
            ShutdownState::Stopping => "STOPPING",
            ShutdownState::Draining => "DRAINING",
            ShutdownState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub records_written: u64,
    pub transitions: Vec<ShutdownState>,
}

pub struct ShutdownCoordinator<C: BusConnection, S: RecordSink> {
    transitions: Vec<ShutdownState>,
    connection: C,
    filter: FilterId,
    queue: HandoffQueue,
    writer: WriterHandle<S>,
    cancel: CancellationToken,
    fatal: FatalReceiver,
}

impl<C: BusConnection, S: RecordSink> ShutdownCoordinator<C, S> {
    /// Takes over an armed pipeline: `filter` installed on `connection`,
    /// `writer` consuming `queue`.
    pub fn new(
        connection: C,
        filter: FilterId,
        queue: HandoffQueue,
        writer: WriterHandle<S>,
        cancel: CancellationToken,
        fatal: FatalReceiver,
    ) -> Self {
        info!("Capture {}", ShutdownState::Running);
        Self {
            transitions: vec![ShutdownState::Running],
            connection,
            filter,
            queue,
            writer,
            cancel,
            fatal,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(ShutdownState::Running)
    }

    /// Runs until the cancellation token fires, then shuts down in order.
    ///
    /// A fatal error reported while running detaches the interceptor, then
    /// stops the writer and closes the file so every record it accepted
    /// reaches the disk, and is returned as is. If the writer is what
    /// failed, whatever it had not written is lost.
    #[instrument(skip_all)]
    pub async fn run(self) -> Result<CaptureSummary, CaptureError> {
        let Self {
            mut transitions,
            mut connection,
            filter,
            queue,
            writer,
            cancel,
            mut fatal,
        } = self;

        let failure = tokio::select! {
            _ = cancel.cancelled() => None,
            err = fatal.recv() => err,
        };

        if let Some(err) = failure {
            error!("Fatal error while capturing: {err}");
            connection.remove_filter(filter);
            if let Err(e) = connection.close().await {
                warn!("Closing bus connection failed: {e}");
            }
            keep_written(&queue, writer);
            return Err(err);
        }

        transition(&mut transitions, ShutdownState::Stopping);
        if !connection.remove_filter(filter) {
            warn!("Interceptor was already detached");
        }
        if let Err(e) = connection.close().await {
            warn!("Closing bus connection failed: {e}");
        }

        transition(&mut transitions, ShutdownState::Draining);
        queue.stop()?;
        let (sink, records_written) = writer.join()?;
        sink.close()?;

        transition(&mut transitions, ShutdownState::Closed);
        info!("Wrote {records_written} records");
        Ok(CaptureSummary {
            records_written,
            transitions,
        })
    }
}

fn transition(transitions: &mut Vec<ShutdownState>, next: ShutdownState) {
    if let Some(current) = transitions.last() {
        info!("Capture {current} -> {next}");
    }
    transitions.push(next);
}

/// Stops the writer after a fatal error and closes the file it was writing.
fn keep_written<S: RecordSink>(queue: &HandoffQueue, writer: WriterHandle<S>) {
    let _ = queue.stop();
    match writer.join() {
        Ok((sink, written)) => match sink.close() {
            Ok(()) => info!("Kept {written} records written before the failure"),
            Err(e) => warn!("Closing capture file failed: {e}"),
        },
        // The writer failed on its own and has already reported it.
        Err(e) => debug!("Writer ended early: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{
        BusCapabilities, BusMessage, Direction, Disposition, FilterChain, MessageFilter,
        MessageKind,
    };
    use crate::interceptor::{Interceptor, InterceptorConfig};
    use crate::writer::tests::MemorySink;
    use async_trait::async_trait;
    use bustap_telemetry::MetricsRecorder;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const OUR_NAME: &str = ":1.7";

    struct ScriptedMessage {
        kind: MessageKind,
        destination: Option<&'static str>,
        wire: &'static [u8],
    }

    impl BusMessage for ScriptedMessage {
        fn to_wire(&self, _caps: BusCapabilities) -> Result<Bytes, CaptureError> {
            Ok(Bytes::from_static(self.wire))
        }
        fn sender(&self) -> Option<String> {
            None
        }
        fn destination(&self) -> Option<String> {
            self.destination.map(String::from)
        }
        fn kind(&self) -> MessageKind {
            self.kind
        }
        fn member(&self) -> Option<String> {
            None
        }
    }

    /// Connection double that logs what happens to it, and whether STOP had
    /// already been pushed at that moment.
    struct ScriptedConnection {
        chain: Arc<FilterChain>,
        queue: HandoffQueue,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl BusConnection for ScriptedConnection {
        fn unique_name(&self) -> Option<String> {
            Some(OUR_NAME.into())
        }

        fn capabilities(&self) -> BusCapabilities {
            BusCapabilities::default()
        }

        fn add_filter(&mut self, filter: Arc<dyn MessageFilter>) -> FilterId {
            self.chain.add(filter)
        }

        fn remove_filter(&mut self, id: FilterId) -> bool {
            self.log
                .lock()
                .push(format!("remove_filter stopped={}", self.queue.is_stopped()));
            self.chain.remove(id)
        }

        async fn close(&mut self) -> Result<(), CaptureError> {
            self.log
                .lock()
                .push(format!("close stopped={}", self.queue.is_stopped()));
            Ok(())
        }
    }

    struct Harness {
        chain: Arc<FilterChain>,
        queue: HandoffQueue,
        log: Arc<Mutex<Vec<String>>>,
        sink: MemorySink,
        cancel: CancellationToken,
        fatal: FatalReporter,
        coordinator: ShutdownCoordinator<ScriptedConnection, MemorySink>,
    }

    fn arm(sink: MemorySink) -> Harness {
        let queue = HandoffQueue::new();
        let chain = Arc::new(FilterChain::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let metrics = Arc::new(MetricsRecorder::new());
        let (fatal, fatal_rx) = fatal_channel();
        let cancel = CancellationToken::new();

        let writer =
            WriterHandle::spawn(queue.share(), sink.clone(), metrics.clone(), fatal.clone())
                .unwrap();
        let mut connection = ScriptedConnection {
            chain: chain.clone(),
            queue: queue.share(),
            log: log.clone(),
        };
        let interceptor = Interceptor::new(
            InterceptorConfig {
                unique_name: connection.unique_name(),
                capabilities: connection.capabilities(),
                echo_messages: false,
            },
            queue.share(),
            metrics,
        );
        let filter = connection.add_filter(Arc::new(interceptor));
        let coordinator = ShutdownCoordinator::new(
            connection,
            filter,
            queue.share(),
            writer,
            cancel.clone(),
            fatal_rx,
        );

        Harness {
            chain,
            queue,
            log,
            sink,
            cancel,
            fatal,
            coordinator,
        }
    }

    #[tokio::test]
    async fn records_in_order_and_suppresses_eavesdropped() {
        let harness = arm(MemorySink::default());
        assert_eq!(harness.coordinator.state(), ShutdownState::Running);

        let call = ScriptedMessage {
            kind: MessageKind::MethodCall,
            destination: Some("org.freedesktop.DBus"),
            wire: b"a",
        };
        let signal = ScriptedMessage {
            kind: MessageKind::Signal,
            destination: Some(":1.12"),
            wire: b"b",
        };
        let reply = ScriptedMessage {
            kind: MessageKind::MethodReturn,
            destination: Some(OUR_NAME),
            wire: b"c",
        };

        let dispositions = [
            harness.chain.run(&call, Direction::Outbound).unwrap(),
            harness.chain.run(&signal, Direction::Inbound).unwrap(),
            harness.chain.run(&reply, Direction::Inbound).unwrap(),
        ];
        assert_eq!(
            dispositions,
            [
                Disposition::Deliver,
                Disposition::Suppress,
                Disposition::Deliver
            ]
        );

        harness.cancel.cancel();
        let summary = harness.coordinator.run().await.unwrap();

        assert_eq!(summary.records_written, 3);
        assert_eq!(
            summary.transitions,
            vec![
                ShutdownState::Running,
                ShutdownState::Stopping,
                ShutdownState::Draining,
                ShutdownState::Closed,
            ]
        );
        let records = harness.sink.records.lock();
        let payloads: Vec<&[u8]> = records.iter().map(|b| b.as_ref()).collect();
        assert_eq!(payloads, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
        assert!(*harness.sink.closed.lock());
    }

    #[tokio::test]
    async fn detaches_before_pushing_stop() {
        let harness = arm(MemorySink::default());
        harness.cancel.cancel();
        harness.coordinator.run().await.unwrap();

        assert_eq!(
            *harness.log.lock(),
            vec![
                "remove_filter stopped=false".to_string(),
                "close stopped=false".to_string(),
            ]
        );
        assert!(harness.chain.is_empty());
        assert!(harness.queue.is_stopped());
    }

    #[tokio::test]
    async fn empty_capture_closes_cleanly() {
        let harness = arm(MemorySink::default());
        harness.cancel.cancel();
        let summary = harness.coordinator.run().await.unwrap();

        assert_eq!(summary.records_written, 0);
        assert!(harness.sink.records.lock().is_empty());
        assert!(*harness.sink.closed.lock());
    }

    #[tokio::test]
    async fn fatal_report_keeps_records_already_accepted() {
        let harness = arm(MemorySink::default());
        for wire in [&b"a"[..], b"b", b"c"] {
            let message = ScriptedMessage {
                kind: MessageKind::MethodReturn,
                destination: Some(OUR_NAME),
                wire,
            };
            harness.chain.run(&message, Direction::Inbound).unwrap();
        }
        harness
            .fatal
            .report(CaptureError::Serialization("unix fds".into()));

        let err = harness.coordinator.run().await.unwrap_err();
        assert!(matches!(err, CaptureError::Serialization(_)));
        assert!(harness.chain.is_empty());
        assert!(harness.queue.is_stopped());
        assert!(*harness.sink.closed.lock());
        assert_eq!(harness.sink.records.lock().len(), 3);
    }

    #[tokio::test]
    async fn writer_failure_wakes_the_coordinator() {
        let harness = arm(MemorySink {
            fail_after: Some(0),
            ..MemorySink::default()
        });
        let message = ScriptedMessage {
            kind: MessageKind::Signal,
            destination: None,
            wire: b"x",
        };
        harness.chain.run(&message, Direction::Inbound).unwrap();

        let err = harness.coordinator.run().await.unwrap_err();
        assert!(matches!(err, CaptureError::SinkWrite(_)));
        // A broken sink is never closed.
        assert!(!*harness.sink.closed.lock());
    }

    #[test]
    fn states_render_uppercase() {
        assert_eq!(ShutdownState::Draining.to_string(), "DRAINING");
    }
}
