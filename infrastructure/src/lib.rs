//! Infrastructure layer for toolgate
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: the compositor that mounts backends, the stdio
//! transport, the in-process tool server and its management tools, the
//! record store, the command evaluator, configuration file loading and the
//! audit trail.

pub mod compositor;
pub mod config;
pub mod evaluator;
pub mod local;
pub mod logging;
pub mod management;
pub mod relay;
pub mod stdio;
pub mod store;

// Re-export commonly used types
pub use compositor::{Compositor, ProviderFactory, ReconcileReport, StdioProviderFactory};
pub use config::{
    ConfigLoader, ConfigSource, ConfigValidationError, FileAuditConfig, FileConfig,
    FileEvaluatorConfig, FileGatewayConfig, FilePolicyConfig,
};
pub use evaluator::CommandPolicyEvaluator;
pub use local::LocalToolServer;
pub use logging::JsonlAuditLogger;
pub use management::{MANAGEMENT_MOUNT, management_server};
pub use relay::NotificationRelay;
pub use stdio::StdioToolProvider;
pub use store::InMemoryRecordStore;
