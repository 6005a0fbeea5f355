use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::mcp::protocol::{MCPError, MCPRequest};

pub const TOOLS_CALL: &str = "tools/call";

/// A decoded request, ready for the dispatch table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcCall {
    pub id: Option<Value>,
    pub method: String,
    pub params: Value,
}

/// Decode an HTTP body into an envelope.
///
/// An empty body decodes to an empty envelope so that endpoints which fix the
/// method by path (`/mcp/tools/list`) accept bodiless requests. On failure the
/// request id is returned alongside the error whenever it could be read.
pub fn decode_body(body: &[u8]) -> Result<MCPRequest, (Option<Value>, MCPError)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(MCPRequest::default());
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| (None, MCPError::parse_error(e)))?;

    if !value.is_object() {
        return Err((
            None,
            MCPError::invalid_request("Request body must be a JSON object"),
        ));
    }

    let id = value.get("id").filter(|id| !id.is_null()).cloned();
    serde_json::from_value(value)
        .map_err(|e| (id, MCPError::invalid_request(format!("Invalid request: {}", e))))
}

/// Resolve the method and parameters of a request.
///
/// `route_method` is the method implied by the endpoint path and wins over the
/// body. Without it, `method` is used, and a bare `name` means `tools/call`.
pub fn normalize(request: MCPRequest, route_method: Option<&str>) -> Result<RpcCall, MCPError> {
    let MCPRequest {
        id,
        method,
        params,
        name,
        arguments,
        ..
    } = request;

    let method = match (route_method, method, name.as_ref()) {
        (Some(route), _, _) => route.to_string(),
        (None, Some(method), _) => method,
        (None, None, Some(_)) => TOOLS_CALL.to_string(),
        (None, None, None) => {
            return Err(MCPError::invalid_request(
                "Request must carry a 'method' or a tool 'name'",
            ))
        }
    };

    let params = match (params, name) {
        (Some(params), _) if !params.is_null() => params,
        (_, Some(name)) => json!({
            "name": name,
            "arguments": arguments.unwrap_or_else(|| Value::Object(Map::new())),
        }),
        _ => Value::Null,
    };

    Ok(RpcCall { id, method, params })
}

/// Wrap a tool payload as MCP text content.
pub fn tool_result(payload: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    json!({
        "content": [
            {
                "type": "text",
                "text": text,
            }
        ],
        "isError": is_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::error_codes;

    fn request(value: Value) -> MCPRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_body_is_an_empty_envelope() {
        let decoded = decode_body(b"  \n").unwrap();
        assert!(decoded.method.is_none());
        assert!(decoded.id.is_none());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let (id, err) = decode_body(b"{not json").unwrap_err();
        assert!(id.is_none());
        assert_eq!(err.code, error_codes::PARSE_ERROR);
    }

    #[test]
    fn non_object_is_an_invalid_request() {
        let (_, err) = decode_body(b"[1, 2]").unwrap_err();
        assert_eq!(err.code, error_codes::INVALID_REQUEST);
    }

    #[test]
    fn wrongly_typed_field_keeps_the_id() {
        let (id, err) = decode_body(br#"{"id": 9, "method": 12}"#).unwrap_err();
        assert_eq!(id, Some(json!(9)));
        assert_eq!(err.code, error_codes::INVALID_REQUEST);
    }

    #[test]
    fn json_rpc_shape_passes_through() {
        let call = normalize(
            request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})),
            None,
        )
        .unwrap();
        assert_eq!(call.method, "tools/list");
        assert_eq!(call.id, Some(json!(1)));
        assert_eq!(call.params, Value::Null);
    }

    #[test]
    fn flattened_shape_becomes_tools_call() {
        let call = normalize(
            request(json!({"id": "a", "name": "run_query", "arguments": {"query": "SELECT 1"}})),
            None,
        )
        .unwrap();
        assert_eq!(call.method, TOOLS_CALL);
        assert_eq!(
            call.params,
            json!({"name": "run_query", "arguments": {"query": "SELECT 1"}})
        );
    }

    #[test]
    fn flattened_shape_without_arguments_gets_empty_object() {
        let call = normalize(request(json!({"name": "get_tables"})), Some(TOOLS_CALL)).unwrap();
        assert_eq!(call.params, json!({"name": "get_tables", "arguments": {}}));
    }

    #[test]
    fn route_method_wins() {
        let call = normalize(
            request(json!({"id": 3, "method": "tools/call", "params": {"name": "x"}})),
            Some("tools/list"),
        )
        .unwrap();
        assert_eq!(call.method, "tools/list");
        assert_eq!(call.params, json!({"name": "x"}));
    }

    #[test]
    fn missing_method_and_name_is_rejected() {
        let err = normalize(request(json!({"id": 1})), None).unwrap_err();
        assert_eq!(err.code, error_codes::INVALID_REQUEST);
    }

    #[test]
    fn tool_result_is_pretty_text_content() {
        let result = tool_result(&json!(["a", "b"]), false);
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["content"][0]["type"], json!("text"));
        let text = result["content"][0]["text"].as_str().unwrap();
        assert_eq!(text, "[\n  \"a\",\n  \"b\"\n]");
    }
}
