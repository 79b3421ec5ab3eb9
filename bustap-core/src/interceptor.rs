//! The bus-side hook that records every message.
//!
//! Runs on the dispatch path, so it only timestamps, serializes and pushes:
//! file I/O happens on the writer thread.

use std::sync::Arc;
use std::time::SystemTime;

use bustap_telemetry::logging::MessageEcho;
use bustap_telemetry::{EventLogger, MetricsRecorder};

use crate::bus::{BusCapabilities, BusMessage, Direction, Disposition, MessageFilter};
use crate::error::CaptureError;
use crate::queue::HandoffQueue;
use crate::record::Record;

/// Everything the interceptor needs, fixed at construction.
#[derive(Clone, Debug)]
pub struct InterceptorConfig {
    /// Our unique bus name. Inbound messages addressed elsewhere are
    /// eavesdropped copies.
    pub unique_name: Option<String>,
    pub capabilities: BusCapabilities,
    /// Echo each message at info rather than debug.
    pub echo_messages: bool,
}

pub struct Interceptor {
    config: InterceptorConfig,
    queue: HandoffQueue,
    metrics: Arc<MetricsRecorder>,
}

impl Interceptor {
    pub fn new(config: InterceptorConfig, queue: HandoffQueue, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            config,
            queue,
            metrics,
        }
    }

    /// Records `message` and decides its disposition.
    ///
    /// The timestamp is read before serialization. On a serialization
    /// failure nothing is enqueued.
    pub fn intercept(
        &self,
        message: &dyn BusMessage,
        direction: Direction,
    ) -> Result<Disposition, CaptureError> {
        let timestamp = SystemTime::now();
        let payload = message.to_wire(self.config.capabilities)?;
        self.queue.push(Record::new(timestamp, payload))?;
        self.metrics.captured_messages.inc();

        let destination = message.destination();
        let sender = message.sender();
        let member = message.member();
        EventLogger::log_message(
            &MessageEcho {
                direction: direction.label(),
                sender: sender.as_deref(),
                destination: destination.as_deref(),
                kind: message.kind().code(),
                member: member.as_deref(),
            },
            self.config.echo_messages,
        );

        let disposition = self.disposition(direction, destination.as_deref());
        if disposition == Disposition::Suppress {
            self.metrics.suppressed_messages.inc();
        }
        Ok(disposition)
    }

    /// Outbound traffic and inbound messages addressed to our unique name
    /// are delivered. Every other inbound message, broadcasts included, was
    /// picked up by the match-everything rules and is suppressed, or the
    /// local stack would answer it.
    pub fn disposition(&self, direction: Direction, destination: Option<&str>) -> Disposition {
        match (direction, destination) {
            (Direction::Outbound, _) => Disposition::Deliver,
            (Direction::Inbound, Some(dest)) if Some(dest) == self.config.unique_name.as_deref() => {
                Disposition::Deliver
            }
            (Direction::Inbound, _) => Disposition::Suppress,
        }
    }
}

impl MessageFilter for Interceptor {
    fn filter(
        &self,
        message: &dyn BusMessage,
        direction: Direction,
    ) -> Result<Disposition, CaptureError> {
        self.intercept(message, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageKind;
    use crate::queue::QueueItem;
    use bytes::Bytes;
    use parking_lot::Mutex;

    struct TestMessage {
        destination: Option<&'static str>,
        wire: &'static [u8],
        unix_fds: u32,
        serialized_at: Mutex<Option<SystemTime>>,
    }

    impl TestMessage {
        fn to(destination: Option<&'static str>) -> Self {
            Self {
                destination,
                wire: b"l\x04\x01\x01",
                unix_fds: 0,
                serialized_at: Mutex::new(None),
            }
        }
    }

    impl BusMessage for TestMessage {
        fn to_wire(&self, caps: BusCapabilities) -> Result<Bytes, CaptureError> {
            *self.serialized_at.lock() = Some(SystemTime::now());
            if self.unix_fds > 0 && !caps.unix_fd_passing {
                return Err(CaptureError::Serialization(
                    "message carries file descriptors".into(),
                ));
            }
            Ok(Bytes::from_static(self.wire))
        }
        fn sender(&self) -> Option<String> {
            Some(":1.99".into())
        }
        fn destination(&self) -> Option<String> {
            self.destination.map(String::from)
        }
        fn kind(&self) -> MessageKind {
            MessageKind::Signal
        }
        fn member(&self) -> Option<String> {
            Some("Changed".into())
        }
    }

    fn interceptor(queue: &HandoffQueue) -> Interceptor {
        Interceptor::new(
            InterceptorConfig {
                unique_name: Some(":1.7".into()),
                capabilities: BusCapabilities {
                    unix_fd_passing: false,
                },
                echo_messages: false,
            },
            queue.share(),
            Arc::new(MetricsRecorder::new()),
        )
    }

    #[test]
    fn outbound_messages_are_delivered() {
        let queue = HandoffQueue::new();
        let hook = interceptor(&queue);
        let message = TestMessage::to(Some(":1.99"));
        assert_eq!(
            hook.intercept(&message, Direction::Outbound).unwrap(),
            Disposition::Deliver
        );
    }

    #[test]
    fn inbound_messages_for_us_are_delivered() {
        let queue = HandoffQueue::new();
        let hook = interceptor(&queue);
        let message = TestMessage::to(Some(":1.7"));
        assert_eq!(
            hook.intercept(&message, Direction::Inbound).unwrap(),
            Disposition::Deliver
        );
    }

    #[test]
    fn eavesdropped_messages_are_suppressed() {
        let queue = HandoffQueue::new();
        let hook = interceptor(&queue);
        let message = TestMessage::to(Some(":1.12"));
        assert_eq!(
            hook.intercept(&message, Direction::Inbound).unwrap(),
            Disposition::Suppress
        );
        assert_eq!(hook.metrics.suppressed_messages.get(), 1);
        // Suppressed or not, the message was recorded.
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn inbound_broadcasts_are_suppressed() {
        let queue = HandoffQueue::new();
        let hook = interceptor(&queue);
        assert_eq!(
            hook.disposition(Direction::Inbound, None),
            Disposition::Suppress
        );
        assert_eq!(
            hook.intercept(&TestMessage::to(None), Direction::Inbound)
                .unwrap(),
            Disposition::Suppress
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn outbound_broadcasts_are_delivered() {
        let queue = HandoffQueue::new();
        let hook = interceptor(&queue);
        assert_eq!(
            hook.disposition(Direction::Outbound, None),
            Disposition::Deliver
        );
    }

    #[test]
    fn unnamed_connection_suppresses_all_addressed_inbound() {
        let queue = HandoffQueue::new();
        let mut hook = interceptor(&queue);
        hook.config.unique_name = None;
        assert_eq!(
            hook.disposition(Direction::Inbound, Some(":1.7")),
            Disposition::Suppress
        );
    }

    #[test]
    fn record_carries_wire_bytes() {
        let queue = HandoffQueue::new();
        let hook = interceptor(&queue);
        let message = TestMessage::to(Some(":1.7"));
        hook.intercept(&message, Direction::Inbound).unwrap();

        match queue.pop() {
            QueueItem::Record(record) => {
                assert_eq!(record.payload().as_ref(), message.wire);
                let serialized_at = message.serialized_at.lock().unwrap();
                assert!(record.timestamp() <= serialized_at);
            }
            QueueItem::Stop => panic!("expected a record"),
        }
    }

    #[test]
    fn serialization_failure_enqueues_nothing() {
        let queue = HandoffQueue::new();
        let hook = interceptor(&queue);
        let mut message = TestMessage::to(Some(":1.7"));
        message.unix_fds = 1;

        let err = hook.intercept(&message, Direction::Inbound).unwrap_err();
        assert!(matches!(err, CaptureError::Serialization(_)));
        assert!(queue.is_empty());
        assert_eq!(hook.metrics.captured_messages.get(), 0);
    }

    #[test]
    fn push_after_stop_is_an_error() {
        let queue = HandoffQueue::new();
        let hook = interceptor(&queue);
        queue.stop().unwrap();
        let err = hook
            .intercept(&TestMessage::to(None), Direction::Inbound)
            .unwrap_err();
        assert!(matches!(err, CaptureError::QueueClosed));
    }
}
