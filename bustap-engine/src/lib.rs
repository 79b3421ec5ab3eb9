//! # bustap-engine
//!
//! Wires a capture session together in the order that loses nothing: the
//! capture file and writer first, then the bus connection and match rules,
//! then the interceptor, then peer enumeration, and finally the shutdown
//! coordinator.

pub mod pipeline;
pub mod runtime;

pub use pipeline::Pipeline;
pub use runtime::{sink_options, CaptureRuntime};
