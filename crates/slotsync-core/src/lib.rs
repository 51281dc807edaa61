use thiserror::Error;

pub mod app_config;
pub mod config;
pub mod fetch;
pub mod payload;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use fetch::{FetchPeriod, FetchStatus};
pub use payload::{PaxAvailabilityPayload, PricePayload, SlotPayload};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
