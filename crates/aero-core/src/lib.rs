pub mod config;
pub mod text;
pub mod types;

pub use config::{ConfigError, ControlConfig, Credentials, VendorConfig};
pub use text::{MAX_ERROR_CHARS, truncate_chars};
pub use types::*;
