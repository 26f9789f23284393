use crate::config::Config;
use crate::error::{GraphnavError, Result};
use crate::graph::GraphAccessor;
use crate::mcp::tools;
use crate::mcp::types::*;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader as AsyncBufReader};

/// MCP server over any graph accessor
pub struct McpServer<A: GraphAccessor> {
    accessor: A,
    config: Config,
}

impl<A: GraphAccessor> McpServer<A> {
    pub fn new(accessor: A, config: Config) -> Self {
        Self { accessor, config }
    }

    /// Process one JSON-RPC request.
    ///
    /// Returns `Ok(None)` for notifications. Handler failures are turned into
    /// JSON-RPC error responses here, so the `Err` arm is reserved for the
    /// transport.
    pub async fn process_mcp_request(
        &self,
        request: JsonRpcRequest,
        initialized: &mut bool,
    ) -> Result<Option<JsonRpcResponse>> {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => {
                if request.method == "notifications/initialized" {
                    *initialized = true;
                    log::info!("Client initialized");
                }
                return Ok(None);
            }
        };

        if request.jsonrpc != "2.0" {
            return Ok(Some(error_response(
                &id,
                error_codes::INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            )));
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&id, &request.params),
            "tools/list" => self.handle_tools_list(&id),
            "tools/call" => self.handle_tools_call(&id, &request.params).await,
            "ping" | "shutdown" => Ok(result_response(&id, Value::Null)),
            _ => Ok(error_response(
                &id,
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            )),
        };

        Ok(Some(response.unwrap_or_else(|e| {
            let code = match e {
                GraphnavError::McpProtocol(_) => error_codes::INVALID_PARAMS,
                _ => error_codes::INTERNAL_ERROR,
            };
            let mut response = error_response(&id, code, e.to_string());
            if let JsonRpcResponsePayload::Error { error } = &mut response.payload {
                error.data = Some(serde_json::json!({ "details": e.to_string() }));
            }
            response
        })))
    }

    /// Serve newline-delimited JSON-RPC until `reader` reaches EOF.
    pub async fn serve<R, W>(&self, reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut initialized = false;

        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(req) => req,
                Err(e) => {
                    log::warn!("Unparseable request: {}", e);
                    if let Some(id) = extract_id_from_line(trimmed) {
                        let response = JsonRpcResponse {
                            jsonrpc: "2.0".to_string(),
                            id,
                            payload: JsonRpcResponsePayload::Error {
                                error: JsonRpcError {
                                    code: error_codes::PARSE_ERROR,
                                    message: format!("Parse error: {}", e),
                                    data: None,
                                },
                            },
                        };
                        send_response(writer, &response).await?;
                    }
                    continue;
                }
            };

            if let Some(response) = self.process_mcp_request(request, &mut initialized).await? {
                send_response(writer, &response).await?;
            }
        }

        Ok(())
    }

    /// Run the MCP server on stdin/stdout
    pub async fn run(&self) -> Result<()> {
        log::info!("graphnav MCP server v{} starting", env!("CARGO_PKG_VERSION"));
        let reader = AsyncBufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        self.serve(reader, &mut stdout).await?;
        log::info!("MCP server shutting down");
        Ok(())
    }

    fn handle_initialize(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: InitializeParams =
            serde_json::from_value(params.clone().unwrap_or(serde_json::json!({})))
                .map_err(|e| GraphnavError::McpProtocol(format!("Invalid initialize params: {}", e)))?;

        // 2024/2025 clients are answered with the stable revision
        let protocol_version = if params.protocol_version.starts_with("2024")
            || params.protocol_version.starts_with("2025")
        {
            "2024-11-05".to_string()
        } else {
            params.protocol_version.clone()
        };

        let result = InitializeResult {
            protocol_version,
            capabilities: serde_json::json!({ "tools": {} }),
            server_info: ServerInfo {
                name: "graphnav".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(result_response(id, to_json(&result)?))
    }

    fn handle_tools_list(&self, id: &JsonRpcId) -> Result<JsonRpcResponse> {
        let result = ToolsListResult {
            tools: tools::get_tool_definitions(&self.config),
        };
        Ok(result_response(id, to_json(&result)?))
    }

    async fn handle_tools_call(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: ToolsCallParams = serde_json::from_value(
            params
                .clone()
                .ok_or_else(|| GraphnavError::McpProtocol("Missing params for tools/call".to_string()))?,
        )
        .map_err(|e| GraphnavError::McpProtocol(format!("Invalid tools/call params: {}", e)))?;

        if !tools::is_known_tool(&params.name) {
            return Ok(error_response(
                id,
                error_codes::INVALID_PARAMS,
                format!("Unknown tool: {}", params.name),
            ));
        }

        log::debug!("tools/call {}", params.name);
        let outcome = tools::call_tool(&self.accessor, &self.config, &params.name, &params.arguments).await;
        let result = tools::into_call_result(outcome, self.config.token_budget());
        Ok(result_response(id, to_json(&result)?))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| GraphnavError::Parse(format!("JSON serialization error: {}", e)))
}

fn result_response(id: &JsonRpcId, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: id.clone().into(),
        payload: JsonRpcResponsePayload::Result { result },
    }
}

fn error_response(id: &JsonRpcId, code: i32, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: id.clone().into(),
        payload: JsonRpcResponsePayload::Error {
            error: JsonRpcError {
                code,
                message,
                data: None,
            },
        },
    }
}

/// Write one response line and flush
async fn send_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| GraphnavError::Parse(format!("JSON serialization error: {}", e)))?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Best-effort id recovery from a line that failed to parse
fn extract_id_from_line(line: &str) -> Option<Value> {
    let id_start = line.find(r#""id":"#)?;
    let rest = &line[id_start + 5..];
    let id_end = rest.find([',', '}'])?;
    let id_val = rest[..id_end].trim();
    if id_val.len() >= 2 && id_val.starts_with('"') && id_val.ends_with('"') {
        Some(Value::String(id_val[1..id_val.len() - 1].to_string()))
    } else {
        id_val.parse::<i64>().ok().map(|n| Value::Number(n.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, InMemoryGraph, Node};
    use serde_json::json;

    fn server() -> McpServer<InMemoryGraph> {
        let mut g = InMemoryGraph::new();
        for id in ["A", "B", "C", "D"] {
            g.add_node(Node::entity(id, id));
        }
        g.add_edge(Edge::relates_to("ab", "A", "B", ""));
        g.add_edge(Edge::relates_to("bc", "B", "C", ""));
        g.add_edge(Edge::relates_to("cd", "C", "D", ""));
        g.add_edge(Edge::relates_to("ad", "A", "D", ""));
        McpServer::new(g, Config::default())
    }

    async fn exchange(server: &McpServer<InMemoryGraph>, input: &str) -> Vec<Value> {
        let mut out: Vec<u8> = Vec::new();
        server.serve(input.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_extract_id_from_line() {
        let line = r#"{"jsonrpc":"2.0","id":"test-123","method":"test"}"#;
        assert_eq!(extract_id_from_line(line), Some(json!("test-123")));

        let line = r#"{"jsonrpc":"2.0","id":42,"method":"test"}"#;
        assert_eq!(extract_id_from_line(line), Some(json!(42)));

        let line = r#"{"jsonrpc":"2.0","method":"x","id":7}"#;
        assert_eq!(extract_id_from_line(line), Some(json!(7)));

        assert_eq!(extract_id_from_line("garbage"), None);
    }

    #[test]
    fn test_json_rpc_request_parsing() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.method, "initialize");
        assert_eq!(request.jsonrpc, "2.0");
    }

    #[tokio::test]
    async fn test_session_over_streams() {
        let server = server();
        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18"}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"find_paths_between_entities","arguments":{"from_uuid":"A","to_uuid":"D"}}}"#,
        ]
        .join("\n");

        let responses = exchange(&server, &input).await;
        assert_eq!(responses.len(), 3);

        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "graphnav");

        assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 4);

        let text = responses[2]["result"]["content"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["paths"][0]["node_sequence"], json!(["A", "D"]));
        assert_eq!(body["paths"][1]["node_sequence"], json!(["A", "B", "C", "D"]));
    }

    #[tokio::test]
    async fn test_tool_error_is_result_not_rpc_error() {
        let server = server();
        let input = r#"{"jsonrpc":"2.0","id":"t","method":"tools/call","params":{"name":"traverse_knowledge_graph","arguments":{"start_node_uuid":"nobody"}}}"#;
        let responses = exchange(&server, input).await;
        assert_eq!(responses[0]["id"], "t");
        assert!(responses[0].get("error").is_none());
        assert_eq!(responses[0]["result"]["isError"], true);
        assert!(responses[0]["result"].get("is_error").is_none());
        let text = responses[0]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("NOT_FOUND: "));
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let server = server();
        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"search_nodes","arguments":{}}}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call"}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"#,
            r#"{"jsonrpc":"1.0","id":5,"method":"tools/list"}"#,
        ]
        .join("\n");
        let responses = exchange(&server, &input).await;
        assert_eq!(responses.len(), 5);
        assert_eq!(responses[0]["error"]["code"], error_codes::METHOD_NOT_FOUND);
        assert_eq!(responses[1]["error"]["code"], error_codes::INVALID_PARAMS);
        assert_eq!(responses[2]["error"]["code"], error_codes::INVALID_PARAMS);
        assert_eq!(responses[3]["id"], 4);
        assert_eq!(responses[3]["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(responses[4]["id"], 5);
        assert_eq!(responses[4]["error"]["code"], error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_initialized_flag() {
        let server = server();
        let mut initialized = false;
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        let response = server.process_mcp_request(request, &mut initialized).await.unwrap();
        assert!(response.is_none());
        assert!(initialized);
    }
}
