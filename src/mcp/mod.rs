//! MCP protocol implementation
//!
//! Kernel, registry, dispatch pipeline, schema validation, and the stdio
//! transport.

pub mod dispatch;
pub mod registry;
pub mod schema;
pub mod server;
pub mod transport;
pub mod types;
