use std::sync::Arc;

use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::mcp::conversion::{tool_result, RpcCall};
use crate::mcp::protocol::{MCPError, MCPResponse, PROTOCOL_VERSION, SERVER_NAME};
use crate::services::DatabaseService;

type MethodFuture<'a> = BoxFuture<'a, Result<Value, MCPError>>;
type MethodHandler = for<'a> fn(&'a MCPDatabaseServer, Value) -> MethodFuture<'a>;

type ToolFuture<'a> = BoxFuture<'a, Result<ToolOutcome, MCPError>>;
type ToolHandler = for<'a> fn(&'a MCPDatabaseServer, Value) -> ToolFuture<'a>;

/// Every JSON-RPC method the server answers. Shared by all transports.
const METHODS: &[(&str, MethodHandler)] = &[
    ("initialize", initialize),
    ("ping", ping),
    ("tools/list", list_tools),
    ("tools/call", call_tool),
    ("resources/list", list_resources),
];

struct ToolSpec {
    name: &'static str,
    description: &'static str,
    input_schema: fn() -> Value,
    handler: ToolHandler,
}

const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_tables",
        description: "Get all database tables",
        input_schema: input_schema::<GetTablesRequest>,
        handler: get_tables,
    },
    ToolSpec {
        name: "run_query",
        description: "Execute a SQL query",
        input_schema: input_schema::<RunQueryRequest>,
        handler: run_query,
    },
];

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTablesRequest {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunQueryRequest {
    #[schemars(description = "SQL query to execute")]
    pub query: String,
}

/// Payload of a tool call. Database failures set `is_error` and carry the
/// error message inside the payload instead of failing the RPC.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub payload: Value,
    pub is_error: bool,
}

impl ToolOutcome {
    fn success(payload: Value) -> Self {
        Self {
            payload,
            is_error: false,
        }
    }

    fn failure(payload: Value) -> Self {
        Self {
            payload,
            is_error: true,
        }
    }
}

#[derive(Clone)]
pub struct MCPDatabaseServer {
    db_service: Arc<dyn DatabaseService>,
}

impl MCPDatabaseServer {
    pub fn new(db_service: Arc<dyn DatabaseService>) -> Self {
        Self { db_service }
    }

    pub fn is_configured(&self) -> bool {
        self.db_service.is_configured()
    }

    pub fn knows_method(method: &str) -> bool {
        METHODS.iter().any(|(name, _)| *name == method)
    }

    /// Dispatch a decoded call. Notifications yield no response.
    pub async fn handle(&self, call: RpcCall) -> Option<MCPResponse> {
        if call.method.starts_with("notifications/") {
            tracing::debug!(method = %call.method, "Notification received");
            return None;
        }

        // Look up the method in the dispatch table
        let handler = METHODS
            .iter()
            .find(|(name, _)| *name == call.method)
            .map(|(_, handler)| *handler);

        let outcome = match handler {
            Some(handler) => handler(self, call.params).await,
            None => {
                tracing::warn!(method = %call.method, "Unknown MCP method");
                Err(MCPError::method_not_found(&call.method))
            }
        };

        if let Err(e) = &outcome {
            tracing::debug!(method = %call.method, code = e.code, message = %e.message, "MCP request failed");
        }

        Some(MCPResponse::from_outcome(call.id, outcome))
    }

    /// Run a tool by name with raw arguments (`null` counts as no arguments).
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutcome, MCPError> {
        let tool = TOOLS
            .iter()
            .find(|tool| tool.name == name)
            .ok_or_else(|| MCPError::invalid_params(format!("Unknown tool: {}", name)))?;

        // Tools without arguments may be called with none at all
        let arguments = if arguments.is_null() {
            Value::Object(Map::new())
        } else {
            arguments
        };

        tracing::info!(tool = name, "Calling tool");
        (tool.handler)(self, arguments).await
    }
}

/// Tool descriptors as returned by `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    TOOLS
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": (tool.input_schema)(),
            })
        })
        .collect()
}

fn input_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"}));

    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
        object
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        object
            .entry("required")
            .or_insert_with(|| Value::Array(Vec::new()));
    }

    value
}

fn initialize(_server: &MCPDatabaseServer, _params: Value) -> MethodFuture<'_> {
    Box::pin(async move {
        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {},
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "instructions": "SQL Server access: get_tables lists base tables, run_query executes a SQL statement and returns its rows.",
        }))
    })
}

fn ping(_server: &MCPDatabaseServer, _params: Value) -> MethodFuture<'_> {
    Box::pin(async move { Ok(json!({})) })
}

fn list_tools(_server: &MCPDatabaseServer, _params: Value) -> MethodFuture<'_> {
    Box::pin(async move { Ok(json!({ "tools": tool_definitions() })) })
}

fn list_resources(_server: &MCPDatabaseServer, _params: Value) -> MethodFuture<'_> {
    Box::pin(async move { Ok(json!({ "resources": [] })) })
}

fn call_tool(server: &MCPDatabaseServer, params: Value) -> MethodFuture<'_> {
    Box::pin(async move {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| MCPError::invalid_params("Missing tool name"))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let outcome = server.call_tool(&name, arguments).await?;

        // Format result for MCP protocol
        Ok(tool_result(&outcome.payload, outcome.is_error))
    })
}

fn get_tables(server: &MCPDatabaseServer, _arguments: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        // Handle database errors in-band
        let outcome = match server.db_service.list_tables().await {
            Ok(tables) => ToolOutcome::success(json!(tables)),
            Err(e) => {
                tracing::error!(error = %e, "Error retrieving tables");
                ToolOutcome::failure(json!([format!("Error: {}", e)]))
            }
        };
        Ok(outcome)
    })
}

fn run_query(server: &MCPDatabaseServer, arguments: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        // Validate query argument
        let request: RunQueryRequest = serde_json::from_value(arguments)
            .map_err(|_| MCPError::invalid_params("Query parameter is required"))?;

        if request.query.trim().is_empty() {
            return Err(MCPError::invalid_params("Query parameter is required"));
        }

        // Handle database errors in-band
        let outcome = match server.db_service.run_query(&request.query).await {
            Ok(rows) => ToolOutcome::success(json!(rows)),
            Err(e) => {
                tracing::error!(error = %e, "Error executing query");
                ToolOutcome::failure(json!([{ "error": e.to_string() }]))
            }
        };
        Ok(outcome)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqlConfig;
    use crate::error::{DbError, DbResult};
    use crate::mcp::protocol::error_codes;
    use crate::models::QueryRow;
    use crate::services::SqlServerService;
    use async_trait::async_trait;

    struct FakeDatabase;

    #[async_trait]
    impl DatabaseService for FakeDatabase {
        async fn list_tables(&self) -> DbResult<Vec<String>> {
            Ok(vec!["Customers".to_string(), "Orders".to_string()])
        }

        async fn run_query(&self, query: &str) -> DbResult<Vec<QueryRow>> {
            if query.contains("broken") {
                return Err(DbError::Conversion("Invalid column name 'broken'".to_string()));
            }
            let mut row = QueryRow::new();
            row.insert("id".to_string(), json!(1));
            row.insert("name".to_string(), json!("Ada"));
            Ok(vec![row])
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    fn fake_server() -> MCPDatabaseServer {
        MCPDatabaseServer::new(Arc::new(FakeDatabase))
    }

    fn unconfigured_server() -> MCPDatabaseServer {
        MCPDatabaseServer::new(Arc::new(SqlServerService::new(SqlConfig::default())))
    }

    fn call(id: i64, method: &str, params: Value) -> RpcCall {
        RpcCall {
            id: Some(json!(id)),
            method: method.to_string(),
            params,
        }
    }

    fn content_json(response: &MCPResponse) -> Value {
        let text = response.result.as_ref().unwrap()["content"][0]["text"]
            .as_str()
            .unwrap();
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn exactly_two_tools_with_schemas() {
        let tools = tool_definitions();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["get_tables", "run_query"]);

        let get_tables = &tools[0]["inputSchema"];
        assert_eq!(get_tables["type"], json!("object"));
        assert_eq!(get_tables["properties"], json!({}));
        assert_eq!(get_tables["required"], json!([]));

        let run_query = &tools[1]["inputSchema"];
        assert_eq!(run_query["type"], json!("object"));
        assert_eq!(run_query["properties"]["query"]["type"], json!("string"));
        assert_eq!(
            run_query["properties"]["query"]["description"],
            json!("SQL query to execute")
        );
        assert_eq!(run_query["required"], json!(["query"]));
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let response = fake_server()
            .handle(call(1, "initialize", json!({})))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(result["serverInfo"]["name"], json!(SERVER_NAME));
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn unknown_method_echoes_id() {
        let response = fake_server()
            .handle(call(42, "tools/destroy", Value::Null))
            .await
            .unwrap();
        assert_eq!(response.id, json!(42));
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let server = fake_server();
        let notification = RpcCall {
            id: None,
            method: "notifications/initialized".to_string(),
            params: Value::Null,
        };
        assert!(server.handle(notification).await.is_none());
    }

    #[tokio::test]
    async fn run_query_returns_rows_as_text() {
        let response = fake_server()
            .handle(call(
                2,
                "tools/call",
                json!({"name": "run_query", "arguments": {"query": "SELECT id, name FROM people"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.result.as_ref().unwrap()["isError"], json!(false));
        assert_eq!(content_json(&response), json!([{"id": 1, "name": "Ada"}]));
    }

    #[tokio::test]
    async fn run_query_failure_is_in_band() {
        let response = fake_server()
            .handle(call(
                3,
                "tools/call",
                json!({"name": "run_query", "arguments": {"query": "SELECT broken"}}),
            ))
            .await
            .unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.result.as_ref().unwrap()["isError"], json!(true));
        let payload = content_json(&response);
        assert!(payload[0]["error"]
            .as_str()
            .unwrap()
            .contains("Invalid column name"));
    }

    #[tokio::test]
    async fn run_query_without_query_is_invalid_params() {
        let server = fake_server();
        for arguments in [json!({}), json!({"query": ""}), json!({"query": 5}), Value::Null] {
            let response = server
                .handle(call(
                    4,
                    "tools/call",
                    json!({"name": "run_query", "arguments": arguments}),
                ))
                .await
                .unwrap();
            assert_eq!(response.error.unwrap().code, error_codes::INVALID_PARAMS);
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let response = fake_server()
            .handle(call(5, "tools/call", json!({"name": "drop_database"})))
            .await
            .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::INVALID_PARAMS);
        assert_eq!(error.message, "Unknown tool: drop_database");
    }

    #[tokio::test]
    async fn get_tables_lists_names() {
        let outcome = fake_server().call_tool("get_tables", Value::Null).await.unwrap();
        assert_eq!(outcome, ToolOutcome::success(json!(["Customers", "Orders"])));
    }

    #[tokio::test]
    async fn unconfigured_tools_return_sentinels() {
        let server = unconfigured_server();

        let tables = server.call_tool("get_tables", json!({})).await.unwrap();
        assert!(tables.is_error);
        assert_eq!(
            tables.payload,
            json!(["Error: SQL_SERVER_CONNECTION_STRING not configured"])
        );

        let rows = server
            .call_tool("run_query", json!({"query": "SELECT 1"}))
            .await
            .unwrap();
        assert!(rows.is_error);
        assert_eq!(
            rows.payload,
            json!([{"error": "SQL_SERVER_CONNECTION_STRING not configured"}])
        );
    }

    #[test]
    fn method_table_lookup() {
        assert!(MCPDatabaseServer::knows_method("tools/list"));
        assert!(!MCPDatabaseServer::knows_method("tools/destroy"));
    }
}
