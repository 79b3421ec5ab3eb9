// bustap-config/src/validation.rs
//! Custom validation functions for configuration.

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

lazy_static! {
    // transport:key=value[,key=value]*[;...]
    static ref DBUS_ADDRESS: Regex =
        Regex::new(r"^[a-z][a-z0-9-]*:([a-z_]+=[^,;]+(,[a-z_]+=[^,;]+)*)?(;.+)?$")
            .expect("static regex");
    static ref LOG_LEVEL: Regex =
        Regex::new("^(trace|debug|info|warn|error|off)$").expect("static regex");
}

/// Validate a bus selector: `session`, `system`, or a D-Bus address string.
pub fn validate_bus_address(address: &str) -> Result<(), ValidationError> {
    if matches!(address, "session" | "system") || DBUS_ADDRESS.is_match(address) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_bus_address"))
    }
}

/// Validate the default log level used when `RUST_LOG` is unset.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVEL.is_match(&level.to_lowercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}
