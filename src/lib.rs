//! MCP server exposing SQL Server table listing and ad-hoc queries over HTTP.
//!
//! Two transports share one dispatch table: an SSE session transport
//! (`GET /sse` + `POST /messages/`) and plain JSON-RPC over `POST /mcp`.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod mcp;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{AppConfig, SqlConfig};
pub use handlers::{app_router, ServerState};
pub use mcp::MCPDatabaseServer;
pub use services::{DatabaseService, SqlServerService};
