use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row: column name → scalar, in server column order.
pub type QueryRow = Map<String, Value>;

/// Response body of `GET /health`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub api_keys_configured: bool,
    pub sql_connection_configured: bool,
    pub implementations: Implementations,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Implementations {
    pub fastmcp_sse: String,
    pub http_mcp: String,
}

impl HealthStatus {
    pub fn healthy(api_keys_configured: bool, sql_connection_configured: bool) -> Self {
        Self {
            status: "healthy".to_string(),
            api_keys_configured,
            sql_connection_configured,
            implementations: Implementations {
                fastmcp_sse: "/sse".to_string(),
                http_mcp: "/mcp".to_string(),
            },
        }
    }
}
