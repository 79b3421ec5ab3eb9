//! # bustap-core
//!
//! The capture pipeline: every message the bus dispatches goes through the
//! [`Interceptor`], becomes a timestamped [`Record`] on the
//! [`HandoffQueue`], and is appended to the capture file by the writer
//! thread. The [`ShutdownCoordinator`] tears this down in an order that
//! loses nothing.
//!
//! ### Key Submodules:
//! - `bus`: collaborator traits a bus backend implements
//! - `queue`: FIFO handoff with an explicit STOP variant
//! - `writer`: the [`RecordSink`] trait and the writer thread
//! - `shutdown`: `RUNNING -> STOPPING -> DRAINING -> CLOSED`

pub mod bus;
pub mod error;
pub mod interceptor;
pub mod queue;
pub mod record;
pub mod shutdown;
pub mod writer;

pub use error::CaptureError;
pub use interceptor::{Interceptor, InterceptorConfig};
pub use queue::{HandoffQueue, QueueItem};
pub use record::Record;
pub use shutdown::{CaptureSummary, ShutdownCoordinator, ShutdownState};
pub use writer::{RecordSink, WriterHandle};
