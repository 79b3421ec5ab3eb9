//! Match rules and name filtering for session setup.

pub const DBUS_NAME: &str = "org.freedesktop.DBus";
pub const DBUS_PATH: &str = "/org/freedesktop/DBus";
pub const DBUS_INTERFACE: &str = "org.freedesktop.DBus";

const MESSAGE_TYPES: [&str; 4] = ["signal", "method_call", "method_return", "error"];

/// One rule per message type, so everything the broker routes is seen.
pub fn match_everything(eavesdrop: bool) -> Vec<String> {
    MESSAGE_TYPES
        .iter()
        .map(|kind| {
            if eavesdrop {
                format!("type='{kind}',eavesdrop=true")
            } else {
                format!("type='{kind}'")
            }
        })
        .collect()
}

/// Well-known names whose owner should be looked up at startup. Unique
/// names and the broker itself are skipped.
pub fn names_to_resolve(names: &[String]) -> impl Iterator<Item = &str> {
    names
        .iter()
        .map(String::as_str)
        .filter(|name| !name.starts_with(':') && *name != DBUS_NAME)
}
