//! bustap-bus
//!
//! The bus side of a capture session over D-Bus:
//! - connect to the session, system or an explicit bus
//! - `AddMatch` for every message type, optionally eavesdropping
//! - a dispatch task running installed filters on every inbound message
//! - outbound calls routed through the same filters before sending
//! - startup peer enumeration
//!
//! Peer enumeration runs after interception starts, but a peer that claims a
//! name between `ListNames` and the `NameOwnerChanged` match taking effect
//! is missed. This is a known limitation.

pub mod connection;
pub mod message;
pub mod rules;

pub use connection::ZbusConnection;
pub use message::ZbusMessage;
