// bustap-config/src/capture.rs
//! Capture file parameters.

use serde::{Deserialize, Deserializer, Serialize};
use validator::{self, Validate};

/// Link-layer type recorded in the capture file's global header.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkTypeSetting {
    /// No particular encapsulation.
    #[default]
    Null,
    /// LINKTYPE_DBUS.
    Dbus,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CaptureConfig {
    #[serde(default)]
    pub link_type: LinkTypeSetting,

    /// Snapshot length in the global header. Records are never truncated, so
    /// this must cover the largest message expected.
    #[validate(range(min = 65535, max = 134217728))]
    #[serde(default = "default_snaplen", deserialize_with = "deserialize_size")]
    pub snaplen: u32,
}

fn default_snaplen() -> u32 {
    1 << 27
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Num(u64),
    Str(String),
}

/// Accepts plain numbers or human-friendly sizes such as "128MiB".
fn deserialize_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let bytes = match SizeValue::deserialize(deserializer)? {
        SizeValue::Num(n) => n as f64,
        SizeValue::Str(s) => {
            let s = s.trim();
            let split = s
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(s.len());
            let (num_part, unit_part) = s.split_at(split);
            let number: f64 = num_part.parse().map_err(serde::de::Error::custom)?;
            let multiplier = match unit_part.trim().to_lowercase().as_str() {
                "kb" | "kib" => 1024.0,
                "mb" | "mib" => 1024.0 * 1024.0,
                "" => 1.0,
                _ => return Err(serde::de::Error::custom("Unknown size unit")),
            };
            number * multiplier
        }
    };
    if bytes > u32::MAX as f64 {
        return Err(serde::de::Error::custom("size does not fit in 32 bits"));
    }
    Ok(bytes as u32)
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            link_type: LinkTypeSetting::default(),
            snaplen: default_snaplen(),
        }
    }
}
