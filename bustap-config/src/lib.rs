//! # bustap configuration
//!
//! Layered configuration: defaults, `config/bustap.yaml`, an explicit file
//! given on the command line, then `BUSTAP_*` environment variables
//! (`__` separates sections, e.g. `BUSTAP_BUS__ADDRESS=system`).

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod bus;
mod capture;
mod error;
mod telemetry;
mod validation;

pub use bus::BusConfig;
pub use capture::{CaptureConfig, LinkTypeSetting};
pub use error::ConfigError;
pub use telemetry::TelemetryConfig;

pub const DEFAULT_CONFIG_FILE: &str = "config/bustap.yaml";
pub const ENV_PREFIX: &str = "BUSTAP_";

#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct BustapConfig {
    #[validate(nested)]
    #[serde(default)]
    pub bus: BusConfig,

    #[validate(nested)]
    #[serde(default)]
    pub capture: CaptureConfig,

    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl BustapConfig {
    /// Loads the full hierarchy. `explicit` must exist when given; the
    /// default file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_base(Path::new(DEFAULT_CONFIG_FILE), explicit)
    }

    fn load_with_base(base: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(BustapConfig::default()));

        if base.exists() {
            figment = figment.merge(Yaml::file(base));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            figment = figment.merge(Yaml::file(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
