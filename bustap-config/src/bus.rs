//! Bus connection parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct BusConfig {
    /// `session`, `system`, or a D-Bus address such as
    /// `unix:path=/run/user/1000/bus`.
    #[validate(custom(function = validation::validate_bus_address))]
    #[serde(default = "default_address")]
    pub address: String,

    /// Ask the broker for eavesdropped copies of third-party traffic.
    #[serde(default = "default_true")]
    pub eavesdrop: bool,

    /// Whether the connection may carry Unix file descriptors. Messages with
    /// descriptors cannot be serialized without it.
    #[serde(default = "default_true")]
    pub unix_fd_passing: bool,

    /// Resolve owners of well-known names at startup so their replies are
    /// captured.
    #[serde(default = "default_true")]
    pub enumerate_peers: bool,
}

fn default_address() -> String {
    "session".into()
}

fn default_true() -> bool {
    true
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            eavesdrop: default_true(),
            unix_fd_passing: default_true(),
            enumerate_peers: default_true(),
        }
    }
}
