//! A started writer plus the queue feeding it, waiting for a bus.

use std::sync::Arc;

use bustap_core::bus::{BusConnection, FilterId};
use bustap_core::shutdown::{fatal_channel, FatalReceiver, FatalReporter};
use bustap_core::{
    CaptureError, HandoffQueue, Interceptor, InterceptorConfig, RecordSink, ShutdownCoordinator,
    WriterHandle,
};
use bustap_telemetry::MetricsRecorder;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Pipeline<S: RecordSink> {
    queue: HandoffQueue,
    writer: WriterHandle<S>,
    metrics: Arc<MetricsRecorder>,
    fatal: FatalReporter,
    fatal_rx: FatalReceiver,
}

impl<S: RecordSink> Pipeline<S> {
    /// Hands `sink` to a fresh writer thread.
    pub fn start(sink: S, metrics: Arc<MetricsRecorder>) -> Result<Self, CaptureError> {
        let queue = HandoffQueue::new();
        let (fatal, fatal_rx) = fatal_channel();
        let writer = WriterHandle::spawn(queue.share(), sink, metrics.clone(), fatal.clone())?;
        Ok(Self {
            queue,
            writer,
            metrics,
            fatal,
            fatal_rx,
        })
    }

    /// For collaborators that fail outside the coordinator's task.
    pub fn fatal_reporter(&self) -> FatalReporter {
        self.fatal.clone()
    }

    /// Arms the interceptor on `connection`, configured from the
    /// connection's own identity and capabilities.
    pub fn install<C: BusConnection>(&self, connection: &mut C, echo_messages: bool) -> FilterId {
        let config = InterceptorConfig {
            unique_name: connection.unique_name(),
            capabilities: connection.capabilities(),
            echo_messages,
        };
        debug!("Installing interceptor: {config:?}");
        let interceptor = Interceptor::new(config, self.queue.share(), self.metrics.clone());
        connection.add_filter(Arc::new(interceptor))
    }

    pub fn into_coordinator<C: BusConnection>(
        self,
        connection: C,
        filter: FilterId,
        cancel: CancellationToken,
    ) -> ShutdownCoordinator<C, S> {
        ShutdownCoordinator::new(
            connection,
            filter,
            self.queue,
            self.writer,
            cancel,
            self.fatal_rx,
        )
    }
}
