//! Mount domain module
//!
//! A mount is a named backend attached to the aggregated tool surface. This
//! module holds the pure parts: name validation, connection specs, lifecycle
//! events, capability snapshots and structural errors. The registry itself
//! lives in the infrastructure layer.

pub mod capabilities;
pub mod error;
pub mod events;
pub mod name;
pub mod spec;

pub use capabilities::{MountCapabilities, MountStatus};
pub use error::MountError;
pub use events::{BackendNotification, MountEvent};
pub use name::{MountName, NAMESPACE_SEPARATOR};
pub use spec::ServerSpec;
