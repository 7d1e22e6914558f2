//! Integration tests for the data MCP server
//!
//! These tests drive the JSON-RPC kernel end-to-end with both modules
//! registered, using in-memory SQLite databases. No network calls are made.

use std::sync::Arc;

use serde_json::{json, Value};

use data_mcp_server::config::Config;
use data_mcp_server::mcp::registry::ToolRegistry;
use data_mcp_server::mcp::server::McpServer;
use data_mcp_server::modules::database::DatabaseModule;
use data_mcp_server::modules::web::WebModule;
use data_mcp_server::modules::ModuleManager;

fn build_server() -> McpServer {
    let registry = Arc::new(ToolRegistry::new());
    let manager = ModuleManager::new(Arc::clone(&registry));
    let config = Config::default();

    manager
        .register_module(Arc::new(DatabaseModule::new(&config)))
        .expect("database module registers");
    manager
        .register_module(Arc::new(WebModule::new(&config).expect("web module builds")))
        .expect("web module registers");

    McpServer::new("data-mcp-server", "1.0.0", registry)
}

async fn send(server: &McpServer, request: Value) -> Value {
    let raw = server.handle_message(&request.to_string()).await;
    serde_json::from_str(&raw).expect("response parses")
}

async fn call_tool(server: &McpServer, id: i64, name: &str, arguments: Value) -> Value {
    send(
        server,
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        }),
    )
    .await
}

/// Text of the single content part of a tool result
fn envelope_text(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().expect("text part")
}

fn is_error(response: &Value) -> bool {
    response["result"]["isError"].as_bool().unwrap_or(false)
}

mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize() {
        let server = build_server();
        let response = send(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
        )
        .await;

        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(response["result"]["capabilities"]["tools"], json!({}));
        assert_eq!(response["result"]["serverInfo"]["name"], "data-mcp-server");
        assert!(response["result"]["serverInfo"]["version"].is_string());
    }

    #[tokio::test]
    async fn test_tools_list_includes_catalogue() {
        let server = build_server();
        let response = send(
            &server,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        )
        .await;

        let tools = response["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        for expected in [
            "connect_database",
            "disconnect_database",
            "execute_query",
            "execute_transaction",
            "list_tables",
            "get_table_schema",
            "get_database_metrics",
            "insert_data",
            "update_data",
            "delete_data",
            "create_table",
            "drop_table",
            "alter_table",
            "fetch_url",
            "fetch_multiple_urls",
            "extract_links",
            "analyze_webpage",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }

        let execute_query = tools
            .iter()
            .find(|t| t["name"] == "execute_query")
            .expect("execute_query advertised");
        assert!(execute_query["inputSchema"]["properties"]["connectionId"].is_object());
    }

    #[tokio::test]
    async fn test_unknown_method_is_protocol_error() {
        let server = build_server();
        let response = send(
            &server,
            json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}),
        )
        .await;

        assert_eq!(response["error"]["code"], -32000);
        assert_eq!(response["error"]["message"], "Unknown method: resources/list");
    }

    #[tokio::test]
    async fn test_tool_not_found_is_protocol_error() {
        let server = build_server();
        let response = call_tool(&server, 4, "no_such_tool", json!({})).await;
        assert_eq!(response["error"]["code"], -32000);
        assert_eq!(response["error"]["message"], "Tool not found: no_such_tool");
    }

    #[tokio::test]
    async fn test_id_parity_string_and_absent() {
        let server = build_server();

        let raw = server
            .handle_message(r#"{"jsonrpc":"2.0","id":"req-42","method":"tools/list"}"#)
            .await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(response["id"], "req-42");

        let raw = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"tools/list"}"#)
            .await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert!(response.get("id").is_none());
    }

    #[tokio::test]
    async fn test_malformed_json_is_protocol_error() {
        let server = build_server();
        let raw = server.handle_message("this is not json").await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(response["error"]["code"], -32000);
    }
}

mod database_tests {
    use super::*;

    async fn connect(server: &McpServer, connection_id: &str) {
        let response = call_tool(
            server,
            100,
            "connect_database",
            json!({
                "connectionId": connection_id,
                "config": {"type": "sqlite", "file": ":memory:"}
            }),
        )
        .await;
        assert!(!is_error(&response), "connect failed: {response}");
        assert_eq!(
            envelope_text(&response),
            format!("Successfully connected to sqlite database: {connection_id}")
        );
    }

    #[tokio::test]
    async fn test_connect_query_roundtrip() {
        let server = build_server();
        connect(&server, "c1").await;

        let response = call_tool(
            &server,
            101,
            "execute_query",
            json!({
                "connectionId": "c1",
                "query": "CREATE TABLE t(id INTEGER PRIMARY KEY, name TEXT)"
            }),
        )
        .await;
        assert!(!is_error(&response), "create failed: {response}");

        let response = call_tool(
            &server,
            102,
            "execute_query",
            json!({
                "connectionId": "c1",
                "query": "INSERT INTO t(id,name) VALUES (?,?)",
                "params": ["1", "alice"]
            }),
        )
        .await;
        assert!(!is_error(&response), "insert failed: {response}");

        let response = call_tool(
            &server,
            103,
            "execute_query",
            json!({"connectionId": "c1", "query": "SELECT * FROM t"}),
        )
        .await;
        assert!(!is_error(&response));

        let body: Value = serde_json::from_str(envelope_text(&response)).expect("result is JSON");
        assert_eq!(body["rowCount"], 1);
        let columns = body["columns"].as_array().unwrap();
        assert!(columns.contains(&json!("id")));
        assert!(columns.contains(&json!("name")));
        assert_eq!(body["rows"][0]["name"], "alice");
    }

    #[tokio::test]
    async fn test_empty_query_fails_validation() {
        let server = build_server();
        connect(&server, "v1").await;

        let response = call_tool(
            &server,
            110,
            "execute_query",
            json!({"connectionId": "v1", "query": ""}),
        )
        .await;

        assert!(is_error(&response));
        let text = envelope_text(&response);
        assert!(text.starts_with("Error: Input validation failed:"), "got: {text}");
        assert!(text.contains("$.query"));
    }

    #[tokio::test]
    async fn test_duplicate_connection_rejected() {
        let server = build_server();
        connect(&server, "dup").await;

        let response = call_tool(
            &server,
            120,
            "connect_database",
            json!({
                "connectionId": "dup",
                "config": {"type": "sqlite", "file": ":memory:"}
            }),
        )
        .await;
        assert!(is_error(&response));
        assert_eq!(envelope_text(&response), "Error: Connection 'dup' already exists");
    }

    #[tokio::test]
    async fn test_unknown_connection_is_error_envelope() {
        let server = build_server();
        let response = call_tool(
            &server,
            130,
            "execute_query",
            json!({"connectionId": "ghost", "query": "SELECT 1"}),
        )
        .await;
        assert!(is_error(&response));
        assert_eq!(envelope_text(&response), "Error: Connection not found: ghost");
    }

    #[tokio::test]
    async fn test_transaction_rolls_back() {
        let server = build_server();
        connect(&server, "tx").await;

        call_tool(
            &server,
            140,
            "execute_query",
            json!({"connectionId": "tx", "query": "CREATE TABLE t(id INTEGER, name TEXT)"}),
        )
        .await;

        let response = call_tool(
            &server,
            141,
            "execute_transaction",
            json!({
                "connectionId": "tx",
                "queries": [
                    {"query": "INSERT INTO t(id,name) VALUES (?,?)", "params": ["1", "a"]},
                    {"query": "INSERT INTO nonexistent VALUES (?)", "params": ["x"]}
                ]
            }),
        )
        .await;
        assert!(is_error(&response));
        assert!(envelope_text(&response).starts_with("Error: Database operation failed"));

        let response = call_tool(
            &server,
            142,
            "execute_query",
            json!({"connectionId": "tx", "query": "SELECT COUNT(*) AS c FROM t"}),
        )
        .await;
        let body: Value = serde_json::from_str(envelope_text(&response)).unwrap();
        assert_eq!(body["rows"][0]["c"], 0);
    }

    #[tokio::test]
    async fn test_transaction_commits_all_statements() {
        let server = build_server();
        connect(&server, "txc").await;

        call_tool(
            &server,
            150,
            "execute_query",
            json!({"connectionId": "txc", "query": "CREATE TABLE t(id INTEGER)"}),
        )
        .await;

        let response = call_tool(
            &server,
            151,
            "execute_transaction",
            json!({
                "connectionId": "txc",
                "queries": [
                    {"query": "INSERT INTO t(id) VALUES (?)", "params": ["1"]},
                    {"query": "INSERT INTO t(id) VALUES (?)", "params": ["2"]}
                ]
            }),
        )
        .await;
        assert!(!is_error(&response), "transaction failed: {response}");

        let body: Value = serde_json::from_str(envelope_text(&response)).unwrap();
        assert_eq!(body["transactionComplete"], true);
        assert_eq!(body["queryCount"], 2);
        assert_eq!(body["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_query_limit_bounds_rows() {
        let server = build_server();
        connect(&server, "lim").await;

        call_tool(
            &server,
            160,
            "execute_query",
            json!({"connectionId": "lim", "query": "CREATE TABLE n(v INTEGER)"}),
        )
        .await;
        for i in 0..5 {
            call_tool(
                &server,
                161,
                "execute_query",
                json!({
                    "connectionId": "lim",
                    "query": "INSERT INTO n(v) VALUES (?)",
                    "params": [i.to_string()]
                }),
            )
            .await;
        }

        let response = call_tool(
            &server,
            162,
            "execute_query",
            json!({"connectionId": "lim", "query": "SELECT v FROM n", "limit": 2}),
        )
        .await;
        let body: Value = serde_json::from_str(envelope_text(&response)).unwrap();
        assert_eq!(body["rowCount"], 2);
        assert_eq!(body["rows"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ddl_and_dml_helpers() {
        let server = build_server();
        connect(&server, "ddl").await;

        let response = call_tool(
            &server,
            170,
            "create_table",
            json!({
                "connectionId": "ddl",
                "tableName": "books",
                "columns": [
                    {"name": "id", "type": "INTEGER", "primaryKey": true},
                    {"name": "title", "type": "TEXT", "notNull": true}
                ]
            }),
        )
        .await;
        assert_eq!(envelope_text(&response), "Table 'books' created successfully.");

        let response = call_tool(
            &server,
            171,
            "insert_data",
            json!({
                "connectionId": "ddl",
                "tableName": "books",
                "data": {"id": 1, "title": "Dune"}
            }),
        )
        .await;
        let body: Value = serde_json::from_str(envelope_text(&response)).unwrap();
        assert_eq!(body["affectedRows"], 1);

        let response = call_tool(
            &server,
            172,
            "update_data",
            json!({
                "connectionId": "ddl",
                "tableName": "books",
                "data": {"title": "Dune Messiah"},
                "where": "id = ?",
                "params": ["1"]
            }),
        )
        .await;
        let body: Value = serde_json::from_str(envelope_text(&response)).unwrap();
        assert_eq!(body["affectedRows"], 1);

        let response = call_tool(
            &server,
            173,
            "alter_table",
            json!({
                "connectionId": "ddl",
                "tableName": "books",
                "action": "add_column",
                "columnDefinition": {"name": "year", "type": "INTEGER"}
            }),
        )
        .await;
        assert_eq!(
            envelope_text(&response),
            "Column added to table 'books' successfully."
        );

        let response = call_tool(
            &server,
            174,
            "delete_data",
            json!({
                "connectionId": "ddl",
                "tableName": "books",
                "where": "id = ?",
                "params": ["1"]
            }),
        )
        .await;
        let body: Value = serde_json::from_str(envelope_text(&response)).unwrap();
        assert_eq!(body["affectedRows"], 1);

        let response = call_tool(
            &server,
            175,
            "drop_table",
            json!({"connectionId": "ddl", "tableName": "books"}),
        )
        .await;
        assert_eq!(envelope_text(&response), "Table 'books' dropped successfully.");
    }

    #[tokio::test]
    async fn test_alter_table_requires_matching_field() {
        let server = build_server();
        connect(&server, "alt").await;

        let response = call_tool(
            &server,
            180,
            "alter_table",
            json!({
                "connectionId": "alt",
                "tableName": "t",
                "action": "add_column"
            }),
        )
        .await;
        assert!(is_error(&response));
        assert!(envelope_text(&response).starts_with("Error: Input validation failed:"));
    }

    #[tokio::test]
    async fn test_introspection_tools() {
        let server = build_server();
        connect(&server, "intro").await;

        call_tool(
            &server,
            190,
            "execute_query",
            json!({
                "connectionId": "intro",
                "query": "CREATE TABLE albums (id INTEGER PRIMARY KEY, name TEXT NOT NULL)"
            }),
        )
        .await;

        let response = call_tool(
            &server,
            191,
            "list_tables",
            json!({"connectionId": "intro"}),
        )
        .await;
        let body: Value = serde_json::from_str(envelope_text(&response)).unwrap();
        assert_eq!(body["tableCount"], 1);
        assert_eq!(body["tables"][0]["name"], "albums");
        assert_eq!(body["tables"][0]["type"], "TABLE");

        let response = call_tool(
            &server,
            192,
            "get_table_schema",
            json!({"connectionId": "intro", "tableName": "albums"}),
        )
        .await;
        let body: Value = serde_json::from_str(envelope_text(&response)).unwrap();
        assert_eq!(body["tableName"], "albums");
        let columns = body["columns"].as_array().unwrap();
        assert_eq!(columns.len(), 2);
        let id = columns.iter().find(|c| c["name"] == "id").unwrap();
        assert_eq!(id["isPrimaryKey"], true);
    }

    #[tokio::test]
    async fn test_metrics_are_monotonic() {
        let server = build_server();
        connect(&server, "met").await;

        let response = call_tool(&server, 200, "get_database_metrics", json!({})).await;
        let before: Value = serde_json::from_str(envelope_text(&response)).unwrap();

        call_tool(
            &server,
            201,
            "execute_query",
            json!({"connectionId": "met", "query": "SELECT 1"}),
        )
        .await;
        call_tool(
            &server,
            202,
            "execute_query",
            json!({"connectionId": "met", "query": "SELECT * FROM missing"}),
        )
        .await;

        let response = call_tool(&server, 203, "get_database_metrics", json!({})).await;
        let after: Value = serde_json::from_str(envelope_text(&response)).unwrap();

        assert!(after["totalQueries"].as_u64() >= before["totalQueries"].as_u64());
        assert_eq!(
            after["totalQueries"].as_u64().unwrap(),
            before["totalQueries"].as_u64().unwrap() + 2
        );
        assert_eq!(
            after["totalErrors"].as_u64().unwrap(),
            before["totalErrors"].as_u64().unwrap() + 1
        );
        assert_eq!(after["activeConnections"], 1);
        assert!(after["connections"]["met"]["totalConnections"].is_u64());
    }

    #[tokio::test]
    async fn test_disconnect_then_query_fails() {
        let server = build_server();
        connect(&server, "gone").await;

        let response = call_tool(
            &server,
            210,
            "disconnect_database",
            json!({"connectionId": "gone"}),
        )
        .await;
        assert_eq!(
            envelope_text(&response),
            "Successfully disconnected from database: gone"
        );

        let response = call_tool(
            &server,
            211,
            "execute_query",
            json!({"connectionId": "gone", "query": "SELECT 1"}),
        )
        .await;
        assert!(is_error(&response));
        assert_eq!(envelope_text(&response), "Error: Connection not found: gone");
    }

    #[tokio::test]
    async fn test_invalid_connection_id_pattern_rejected() {
        let server = build_server();
        let response = call_tool(
            &server,
            220,
            "connect_database",
            json!({
                "connectionId": "bad id!",
                "config": {"type": "sqlite", "file": ":memory:"}
            }),
        )
        .await;
        assert!(is_error(&response));
        let text = envelope_text(&response);
        assert!(text.starts_with("Error: Input validation failed:"));
        assert!(text.contains("$.connectionId"));
    }
}

mod web_tests {
    use super::*;

    #[tokio::test]
    async fn test_multi_fetch_url_cap() {
        let server = build_server();
        let urls: Vec<String> = (0..11).map(|i| format!("https://example.com/{i}")).collect();

        let response = call_tool(
            &server,
            300,
            "fetch_multiple_urls",
            json!({"urls": urls}),
        )
        .await;
        assert!(is_error(&response));
        assert!(envelope_text(&response).contains("Cannot fetch more than 10"));
    }

    #[tokio::test]
    async fn test_fetch_url_requires_url() {
        let server = build_server();
        let response = call_tool(&server, 301, "fetch_url", json!({})).await;
        assert!(is_error(&response));
        assert!(envelope_text(&response).starts_with("Error: Input validation failed:"));
    }

    #[tokio::test]
    async fn test_extract_links_rejects_bad_filter() {
        let server = build_server();
        let response = call_tool(
            &server,
            302,
            "extract_links",
            json!({"url": "https://example.com", "options": {"filter": "bogus"}}),
        )
        .await;
        assert!(is_error(&response));
        assert!(envelope_text(&response).contains("$.options.filter"));
    }
}
