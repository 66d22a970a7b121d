//! Integration tests for the line-delimited JSON-RPC transport

mod common;

use common::create_test_dispatcher;
use serde_json::Value;
use solveit_core::{McpServer, SecurityPolicy};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Feed `input` to a server and collect its responses keyed by id
async fn exchange(policy: SecurityPolicy, input: &str) -> HashMap<i64, Value> {
    let (_tmp, dispatcher) = create_test_dispatcher(policy);
    let server = McpServer::new(Arc::new(dispatcher));

    let (client, mut observer) = tokio::io::duplex(1 << 20);
    server.serve(input.as_bytes(), client).await.unwrap();

    let mut written = String::new();
    observer.read_to_string(&mut written).await.unwrap();

    written
        .lines()
        .map(|line| {
            let response: Value = serde_json::from_str(line).unwrap();
            (response["id"].as_i64().unwrap_or(-1), response)
        })
        .collect()
}

#[tokio::test]
async fn test_session_handshake_and_catalogue() {
    let input = [
        r#"{"jsonrpc":"2.0","method":"initialize","id":1,"params":{"protocolVersion":"2024-11-05"}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        r#"{"jsonrpc":"2.0","method":"tools/list","id":2}"#,
    ]
    .join("\n");

    let responses = exchange(SecurityPolicy::default(), &input).await;
    assert_eq!(responses.len(), 2);

    let init = &responses[&1]["result"];
    assert_eq!(init["protocolVersion"], "2024-11-05");
    assert!(init["capabilities"]["tools"].is_object());

    let tools = responses[&2]["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 20);
    assert!(tools
        .iter()
        .all(|t| t["inputSchema"]["type"] == "object" && t["description"].is_string()));
}

#[tokio::test]
async fn test_tool_results_and_errors_on_the_wire() {
    let input = [
        r#"{"jsonrpc":"2.0","method":"tools/call","id":1,"params":{"name":"get_mitigation_details","arguments":{"mitigation_id":"M1001"}}}"#,
        r#"{"jsonrpc":"2.0","method":"tools/call","id":2,"params":{"name":"get_technique_details","arguments":{"technique_id":"T9999"}}}"#,
        r#"{"jsonrpc":"2.0","method":"tools/call","id":3,"params":{"name":"nope","arguments":{}}}"#,
        r#"{"jsonrpc":"2.0","method":"tools/call","id":4,"params":{"name":"search","arguments":[1,2]}}"#,
        r#"{"jsonrpc":"2.0","method":"resources/list","id":5}"#,
    ]
    .join("\n");

    let responses = exchange(SecurityPolicy::default(), &input).await;
    assert_eq!(responses.len(), 5);

    let text = responses[&1]["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Use a hardware write blocker"));

    assert_eq!(
        responses[&2]["result"]["content"][0]["text"],
        "Technique T9999 not found."
    );
    assert_eq!(responses[&3]["error"]["code"], -32602);

    let security = &responses[&4]["error"];
    assert_eq!(security["code"], -32001);
    assert!(security["message"]
        .as_str()
        .unwrap()
        .starts_with("Security policy violation:"));

    assert_eq!(responses[&5]["error"]["code"], -32601);
}

#[tokio::test]
async fn test_rate_limit_over_the_wire() {
    let input = (1..=3)
        .map(|id| {
            format!(
                r#"{{"jsonrpc":"2.0","method":"tools/call","id":{},"params":{{"name":"list_objectives"}}}}"#,
                id
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let responses = exchange(
        SecurityPolicy {
            request_rate_per_minute: 2,
            ..SecurityPolicy::default()
        },
        &input,
    )
    .await;

    let rejected: Vec<&Value> = responses
        .values()
        .filter(|r| r["error"]["code"] == -32001)
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(
        rejected[0]["error"]["message"],
        "Security policy violation: Rate limit exceeded. Please slow down."
    );
}

#[tokio::test]
async fn test_garbage_line_does_not_stop_server() {
    let input = [
        "this is not json",
        r#"{"jsonrpc":"2.0","method":"ping","id":9}"#,
    ]
    .join("\n");

    let responses = exchange(SecurityPolicy::default(), &input).await;
    assert_eq!(responses[&-1]["error"]["code"], -32700);
    assert!(responses[&9]["result"].is_object());
}
