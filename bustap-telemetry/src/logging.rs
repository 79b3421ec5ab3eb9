//! Structured logging with tracing.
//!
//! Everything goes to stderr; stdout is left to the operator.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// One line of the per-message console echo.
#[derive(Debug, Clone, Copy)]
pub struct MessageEcho<'a> {
    pub direction: &'a str,
    pub sender: Option<&'a str>,
    pub destination: Option<&'a str>,
    pub kind: u8,
    pub member: Option<&'a str>,
}

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
    /// A second call is a no-op.
    pub fn init(default_level: &str) {
        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Echoes an intercepted message, at info when `loud` and debug otherwise.
    #[inline]
    pub fn log_message(echo: &MessageEcho<'_>, loud: bool) {
        let sender = echo.sender.unwrap_or("(null)");
        let destination = echo.destination.unwrap_or("(null)");
        let member = echo.member.unwrap_or("(null)");
        if loud {
            tracing::info!(
                direction = echo.direction,
                sender,
                destination,
                kind = echo.kind,
                member,
                "({}) {} -> {}: {} {}",
                echo.direction,
                sender,
                destination,
                echo.kind,
                member
            );
        } else {
            tracing::debug!(
                direction = echo.direction,
                sender,
                destination,
                kind = echo.kind,
                member,
                "message intercepted"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn echo() -> MessageEcho<'static> {
        MessageEcho {
            direction: "incoming",
            sender: Some(":1.42"),
            destination: Some(":1.7"),
            kind: 4,
            member: Some("NameOwnerChanged"),
        }
    }

    #[traced_test]
    #[test]
    fn loud_echo_renders_summary_line() {
        EventLogger::log_message(&echo(), true);
        assert!(logs_contain("(incoming) :1.42 -> :1.7: 4 NameOwnerChanged"));
    }

    #[traced_test]
    #[test]
    fn missing_fields_render_as_null() {
        let mut quiet = echo();
        quiet.destination = None;
        EventLogger::log_message(&quiet, true);
        assert!(logs_contain("-> (null)"));
    }
}
