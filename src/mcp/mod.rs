pub mod conversion;
pub mod protocol;
pub mod server;

// Re-export key components for easier imports
pub use conversion::RpcCall;
pub use protocol::{MCPError, MCPRequest, MCPResponse};
pub use server::{tool_definitions, MCPDatabaseServer, ToolOutcome};
