//! Captured message records.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// One captured bus message: the wall-clock time it was intercepted and its
/// exact wire encoding.
///
/// Fields are private so a record cannot change between interception and
/// writing; the payload length is what the capture header declares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    timestamp: SystemTime,
    payload: Bytes,
}

impl Record {
    #[inline]
    pub fn new(timestamp: SystemTime, payload: Bytes) -> Self {
        Self { timestamp, payload }
    }

    #[inline]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Offset from the Unix epoch, as stored in capture headers. Clocks set
    /// before 1970 collapse to zero.
    pub fn since_epoch(&self) -> Duration {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
