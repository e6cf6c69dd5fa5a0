//! Configuration file loading for toolgate
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `TOOLGATE_`-prefixed environment variables (`TOOLGATE_GATEWAY__AGENT_ID`)
//! 2. `--config <path>` specified file
//! 3. Project root: `./toolgate.toml` or `./.toolgate.toml`
//! 4. Global: `$XDG_CONFIG_HOME/toolgate/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileAuditConfig, FileConfig, FileEvaluatorConfig, FileGatewayConfig,
    FilePolicyConfig,
};
pub use loader::{ConfigLoader, ConfigSource};
