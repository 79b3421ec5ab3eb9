use bytes::Bytes;
use bustap_core::bus::{BusCapabilities, BusMessage, MessageKind};
use bustap_core::CaptureError;
use zbus::message::Type;
use zbus::Message;

/// A zbus message seen through the interceptor's eyes.
#[derive(Clone, Debug)]
pub struct ZbusMessage(pub Message);

impl ZbusMessage {
    pub fn unix_fds(&self) -> u32 {
        self.0.header().unix_fds().unwrap_or(0)
    }
}

impl BusMessage for ZbusMessage {
    fn to_wire(&self, caps: BusCapabilities) -> Result<Bytes, CaptureError> {
        let fds = self.unix_fds();
        if fds > 0 && !caps.unix_fd_passing {
            return Err(CaptureError::Serialization(format!(
                "message carries {fds} Unix file descriptor(s) but the connection cannot pass them"
            )));
        }
        Ok(Bytes::copy_from_slice(self.0.data()))
    }

    fn sender(&self) -> Option<String> {
        self.0.header().sender().map(|name| name.to_string())
    }

    fn destination(&self) -> Option<String> {
        self.0.header().destination().map(|name| name.to_string())
    }

    fn kind(&self) -> MessageKind {
        match self.0.message_type() {
            Type::MethodCall => MessageKind::MethodCall,
            Type::MethodReturn => MessageKind::MethodReturn,
            Type::Error => MessageKind::Error,
            Type::Signal => MessageKind::Signal,
        }
    }

    fn member(&self) -> Option<String> {
        self.0.header().member().map(|member| member.to_string())
    }
}
