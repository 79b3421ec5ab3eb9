//! Capture session runtime over D-Bus.

use std::path::Path;
use std::sync::Arc;

use bustap_bus::ZbusConnection;
use bustap_capture::{LinkType, PcapSink, PcapSinkOptions};
use bustap_config::{BustapConfig, CaptureConfig, LinkTypeSetting};
use bustap_core::{CaptureError, CaptureSummary};
use bustap_telemetry::MetricsRecorder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::pipeline::Pipeline;

pub fn sink_options(config: &CaptureConfig) -> PcapSinkOptions {
    PcapSinkOptions {
        link_type: match config.link_type {
            LinkTypeSetting::Null => LinkType::Null,
            LinkTypeSetting::Dbus => LinkType::Dbus,
        },
        snaplen: config.snaplen,
    }
}

pub struct CaptureRuntime {
    config: Arc<BustapConfig>,
    pub metrics: Arc<MetricsRecorder>,
}

impl CaptureRuntime {
    pub fn new(config: BustapConfig) -> Self {
        debug!("Runtime config: {config:?}");
        Self {
            config: Arc::new(config),
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    /// Records all bus traffic to `output` until `cancel` fires.
    #[instrument(skip_all, fields(output = %output.display()))]
    pub async fn run(
        &self,
        output: &Path,
        cancel: CancellationToken,
    ) -> Result<CaptureSummary, CaptureError> {
        // The file exists before the interceptor is armed.
        let sink = PcapSink::create(output, sink_options(&self.config.capture))?;
        let pipeline = Pipeline::start(sink, self.metrics.clone())?;

        let bus = &self.config.bus;
        let mut connection = ZbusConnection::connect(bus, pipeline.fatal_reporter()).await?;
        connection.match_everything(bus.eavesdrop).await?;

        let filter = pipeline.install(&mut connection, self.config.telemetry.echo_messages);
        if bus.enumerate_peers {
            connection.enumerate_peers().await?;
        }

        info!("Capturing; press Enter or Ctrl-C to stop");
        let summary = pipeline
            .into_coordinator(connection, filter, cancel)
            .run()
            .await?;
        self.log_summary(&summary);
        Ok(summary)
    }

    fn log_summary(&self, summary: &CaptureSummary) {
        info!(
            records = summary.records_written,
            bytes = self.metrics.written_bytes.get(),
            captured = self.metrics.captured_messages.get(),
            suppressed = self.metrics.suppressed_messages.get(),
            "Capture finished"
        );
        if let Ok(text) = self.metrics.gather_metrics() {
            debug!("Final metrics:\n{text}");
        }
    }
}
