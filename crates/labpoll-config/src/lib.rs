pub mod global;
pub mod loader;

pub use global::{GlobalConfig, LoggingConfig, NotifyConfig, PollingConfig, StoreConfig, SystemConfig};
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
