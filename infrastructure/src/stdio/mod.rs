//! Stdio transport for mounted backends
//!
//! Backends run as child processes and speak JSON-RPC 2.0 over their
//! stdin/stdout with `Content-Length` framing.
//!
//! - [`protocol`]: request, response and method payload types
//! - [`transport`]: framing codec and message classification
//! - [`connection`]: background reader plus request correlation
//! - [`provider`]: [`StdioToolProvider`], the process lifecycle

pub mod connection;
pub mod protocol;
pub mod provider;
pub mod transport;

pub use connection::RpcConnection;
pub use provider::{DEFAULT_REQUEST_TIMEOUT, StdioToolProvider};
