//! Data MCP Server Library
//!
//! A Model Context Protocol (MCP) server exposing SQL database and web
//! content tools over a line-delimited JSON-RPC stdio transport.

pub mod config;
pub mod error;
pub mod mcp;
pub mod modules;

pub use config::Config;
pub use error::{DataMcpError, Result};
