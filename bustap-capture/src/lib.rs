//! bustap-capture
//!
//! Capture-file sink for the writer thread. Records land in a classic pcap
//! file: one global header, then a per-record header and the raw D-Bus
//! message for every record.

pub mod pcap_sink;

pub use pcap_sink::{LinkType, PcapSink, PcapSinkOptions};
