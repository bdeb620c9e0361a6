//! Transport-level tests: handshake ordering and tool dispatch over
//! in-memory JSON-RPC messages.

use std::sync::Arc;

use serde_json::{json, Value};
use weft_core::TaskService;
use weft_database::SqliteTaskStore;
use weft_mocks::MockGitDriver;
use weft_protocol::StdioMcpServer;

async fn test_server() -> StdioMcpServer<SqliteTaskStore, MockGitDriver> {
    let store = SqliteTaskStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();
    let service = TaskService::new(Arc::new(store), Arc::new(MockGitDriver::new()));
    StdioMcpServer::new(service)
}

async fn handshake(server: &mut StdioMcpServer<SqliteTaskStore, MockGitDriver>) {
    let response = server
        .process_message(r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{}}"#)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response["result"]["serverInfo"]["name"], "weft-mcp");

    let none = server
        .process_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await
        .unwrap();
    assert!(none.is_none());
}

fn call(id: i64, name: &str, arguments: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
    .to_string()
}

#[tokio::test]
async fn test_requests_before_initialize_are_rejected() {
    let mut server = test_server().await;
    let result = server
        .process_message(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_tools_list_after_handshake() {
    let mut server = test_server().await;
    handshake(&mut server).await;

    let response = server
        .process_message(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
        .await
        .unwrap()
        .unwrap();
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 10);
}

#[tokio::test]
async fn test_create_claim_roundtrip_over_the_wire() {
    let mut server = test_server().await;
    handshake(&mut server).await;

    let response = server
        .process_message(&call(
            1,
            "create_tasks",
            json!({
                "title": "Blog",
                "tasks": [
                    {"title": "DB Schema"},
                    {"title": "CRUD API", "depends_on": [1]}
                ]
            }),
        ))
        .await
        .unwrap()
        .unwrap();

    let tasks = response["result"]["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["status"], "pending");
    assert_eq!(tasks[1]["status"], "blocked");
    let first_id = tasks[0]["id"].as_str().unwrap().to_string();

    // Claiming the unblocked task succeeds over the wire.
    let response = server
        .process_message(&call(2, "claim_task", json!({ "task_id": first_id })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response["result"]["success"], true);
    assert!(response["result"]["agent_id"].as_str().is_some());

    // Claiming the blocked task is a soft failure, not a JSON-RPC error.
    let blocked_id = tasks[1]["id"].as_str().unwrap();
    let response = server
        .process_message(&call(3, "claim_task", json!({ "task_id": blocked_id })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response["result"]["success"], false);
    assert!(response.get("error").is_none());
}

#[tokio::test]
async fn test_unknown_tool_yields_protocol_error() {
    let mut server = test_server().await;
    handshake(&mut server).await;

    let response = server
        .process_message(&call(1, "frobnicate", json!({})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response["error"]["code"], -32007);
}

#[tokio::test]
async fn test_invalid_params_yield_validation_error() {
    let mut server = test_server().await;
    handshake(&mut server).await;

    let response = server
        .process_message(&call(1, "get_task", json!({ "wrong_field": 1 })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response["error"]["code"], -32002);
}

#[tokio::test]
async fn test_health_check_tool() {
    let mut server = test_server().await;
    handshake(&mut server).await;

    let response = server
        .process_message(&call(1, "health_check", json!({})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response["result"]["status"], "healthy");
    assert_eq!(response["result"]["database"], true);
}
