//! Prometheus counters for the capture pipeline.

use prometheus::{IntCounter, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub captured_messages: IntCounter,
    pub suppressed_messages: IntCounter,
    pub written_records: IntCounter,
    pub written_bytes: IntCounter,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    // Names and help strings are static and valid; registration into a
    // fresh registry cannot collide.
    let counter = IntCounter::new(name, help).expect("valid metric definition");
    registry
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let captured_messages = counter(
            &registry,
            "bustap_messages_captured_total",
            "Messages recorded by the interceptor",
        );
        let suppressed_messages = counter(
            &registry,
            "bustap_messages_suppressed_total",
            "Eavesdropped messages withheld from local delivery",
        );
        let written_records = counter(
            &registry,
            "bustap_records_written_total",
            "Records appended to the capture file",
        );
        let written_bytes = counter(
            &registry,
            "bustap_payload_bytes_written_total",
            "Payload bytes appended to the capture file",
        );

        Self {
            registry,
            captured_messages,
            suppressed_messages,
            written_records,
            written_bytes,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn record_written(&self, payload_len: usize) {
        self.written_records.inc();
        self.written_bytes.inc_by(payload_len as u64);
    }
}
