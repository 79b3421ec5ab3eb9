//! Bus collaborator contract.
//!
//! The pipeline does not talk to a bus directly. A backend supplies messages
//! through [`BusMessage`], runs installed [`MessageFilter`]s for every
//! inbound and outbound message before delivery, and can be detached and
//! closed through [`BusConnection`]. [`FilterChain`] is the filter table
//! backends embed to get the detach guarantee right.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::CaptureError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Inbound => "incoming",
            Direction::Outbound => "outgoing",
        }
    }
}

/// What happens to a message after it has been recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Normal delivery continues.
    Deliver,
    /// The message was only eavesdropped; local delivery is skipped.
    Suppress,
}

/// Capabilities negotiated with the bus, fixed for the life of the connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusCapabilities {
    pub unix_fd_passing: bool,
}

/// D-Bus message types, numbered as on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    MethodCall = 1,
    MethodReturn = 2,
    Error = 3,
    Signal = 4,
}

impl MessageKind {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A message as seen by the interceptor.
pub trait BusMessage {
    /// Canonical wire encoding. Fails if the message cannot be expressed
    /// under the connection's capabilities.
    fn to_wire(&self, caps: BusCapabilities) -> Result<Bytes, CaptureError>;

    fn sender(&self) -> Option<String>;

    fn destination(&self) -> Option<String>;

    fn kind(&self) -> MessageKind;

    fn member(&self) -> Option<String>;
}

/// Hook invoked once per message on the dispatch path.
pub trait MessageFilter: Send + Sync {
    fn filter(
        &self,
        message: &dyn BusMessage,
        direction: Direction,
    ) -> Result<Disposition, CaptureError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterId(u64);

/// Connection-side half of the contract.
#[async_trait]
pub trait BusConnection: Send {
    /// This connection's unique bus name, once assigned.
    fn unique_name(&self) -> Option<String>;

    fn capabilities(&self) -> BusCapabilities;

    fn add_filter(&mut self, filter: Arc<dyn MessageFilter>) -> FilterId;

    /// Detaches a filter. Once this returns the filter is not running and
    /// will never be invoked again.
    fn remove_filter(&mut self, id: FilterId) -> bool;

    async fn close(&mut self) -> Result<(), CaptureError>;
}

/// Ordered filter table.
///
/// Invocations hold the read lock for the whole chain, so
/// [`FilterChain::remove`] waits out any in-flight call before returning.
#[derive(Default)]
pub struct FilterChain {
    filters: RwLock<Vec<(FilterId, Arc<dyn MessageFilter>)>>,
    next_id: AtomicU64,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, filter: Arc<dyn MessageFilter>) -> FilterId {
        let id = FilterId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.filters.write().push((id, filter));
        id
    }

    pub fn remove(&self, id: FilterId) -> bool {
        let mut filters = self.filters.write();
        let before = filters.len();
        filters.retain(|(existing, _)| *existing != id);
        filters.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }

    /// Runs filters in installation order. The first one to suppress ends
    /// the chain.
    pub fn run(
        &self,
        message: &dyn BusMessage,
        direction: Direction,
    ) -> Result<Disposition, CaptureError> {
        let filters = self.filters.read();
        for (_, filter) in filters.iter() {
            if filter.filter(message, direction)? == Disposition::Suppress {
                return Ok(Disposition::Suppress);
            }
        }
        Ok(Disposition::Deliver)
    }
}
