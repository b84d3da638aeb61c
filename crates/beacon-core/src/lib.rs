pub mod config;

pub use config::{BeaconConfig, ConfigError, MonitorSettings, ServiceEntry, StorageSettings, TickPolicy};
