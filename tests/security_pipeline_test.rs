//! End-to-end tests for the tool call security pipeline
//!
//! Every call goes through `Dispatcher::call_tool` against an on-disk
//! knowledge base, so request validation, execution bounds and response
//! validation are all exercised together.

mod common;

use common::{count, counting_tool, create_custom_dispatcher, create_test_dispatcher};
use serde_json::{json, Value};
use solveit_core::{SecurityPolicy, SecurityViolation, SolveItError, ToolSecurityProfile};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

fn violation(result: solveit_core::Result<String>) -> SecurityViolation {
    match result {
        Err(SolveItError::Security(v)) => v,
        other => panic!("Expected security violation, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_search_returns_all_categories() {
    let (_tmp, dispatcher) = create_test_dispatcher(SecurityPolicy::default());
    let bucket = dispatcher.security().requests().rate_limiter();
    let before = bucket.available();

    let out = dispatcher
        .call_tool("search", json!({"keywords": "forensic"}))
        .await
        .unwrap();

    let results: Value = serde_json::from_str(&out).unwrap();
    for key in ["techniques", "weaknesses", "mitigations"] {
        assert!(results[key].is_array(), "missing category {}", key);
    }
    assert_eq!(results["techniques"][0]["id"], "T1001");

    // One admission, plus at most a sliver of refill
    let spent = before - bucket.available();
    assert!((0.5..=1.0).contains(&spent), "spent {} tokens", spent);
}

#[tokio::test]
async fn test_each_call_consumes_exactly_one_token() {
    let (_tmp, dispatcher) = create_test_dispatcher(SecurityPolicy {
        request_rate_per_minute: 1,
        ..SecurityPolicy::default()
    });

    dispatcher
        .call_tool("search", json!({"keywords": "memory"}))
        .await
        .unwrap();

    let second = dispatcher
        .call_tool("search", json!({"keywords": "memory"}))
        .await;
    assert_eq!(violation(second), SecurityViolation::RateLimitExceeded);
}

#[tokio::test]
async fn test_unknown_technique_is_plain_text() {
    let (_tmp, dispatcher) = create_test_dispatcher(SecurityPolicy::default());

    let out = dispatcher
        .call_tool("get_technique_details", json!({"technique_id": "T9999"}))
        .await
        .unwrap();
    assert_eq!(out, "Technique T9999 not found.");
}

#[tokio::test]
async fn test_relationship_traversal() {
    let (_tmp, dispatcher) = create_test_dispatcher(SecurityPolicy::default());

    let out = dispatcher
        .call_tool("get_techniques_for_mitigation", json!({"mitigation_id": "M1002"}))
        .await
        .unwrap();
    let techniques: Vec<Value> = serde_json::from_str(&out).unwrap();
    let mut ids: Vec<&str> = techniques.iter().filter_map(|t| t["id"].as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["T1001", "T1002"]);
}

#[tokio::test]
async fn test_burst_of_101_calls_hits_rate_limit() {
    let (_tmp, dispatcher) = create_test_dispatcher(SecurityPolicy::default());

    for i in 0..100 {
        let result = dispatcher
            .call_tool("get_technique_details", json!({"technique_id": "T1001"}))
            .await;
        assert!(result.is_ok(), "call {} failed: {:?}", i + 1, result);
    }

    let last = dispatcher
        .call_tool("get_technique_details", json!({"technique_id": "T1001"}))
        .await;
    assert_eq!(violation(last), SecurityViolation::RateLimitExceeded);
}

#[tokio::test]
async fn test_rejected_request_never_reaches_tool() {
    let calls = Arc::new(AtomicUsize::new(0));
    let policy = SecurityPolicy {
        max_string_length: 16,
        max_input_bytes: 256,
        ..SecurityPolicy::default()
    };
    let (_tmp, dispatcher) = create_custom_dispatcher(
        vec![counting_tool(
            "echo",
            ToolSecurityProfile::default(),
            "ok",
            Arc::clone(&calls),
        )],
        policy.clone(),
    );

    let too_long = dispatcher
        .call_tool("echo", json!({"value": "x".repeat(17)}))
        .await;
    assert!(matches!(
        violation(too_long),
        SecurityViolation::StringTooLong { ref path, .. } if path == "value"
    ));

    let too_big = dispatcher
        .call_tool("echo", json!({"a": "x".repeat(16), "b": vec!["y".repeat(16); 20]}))
        .await;
    assert!(matches!(
        violation(too_big),
        SecurityViolation::InputTooLarge { limit: 256, .. }
    ));

    let not_a_mapping = dispatcher.call_tool("echo", json!(["value"])).await;
    assert!(matches!(
        violation(not_a_mapping),
        SecurityViolation::DangerousType { .. }
    ));

    assert_eq!(count(&calls), 0);

    assert_eq!(
        dispatcher.call_tool("echo", json!({"value": "fine"})).await.unwrap(),
        "ok"
    );
    assert_eq!(count(&calls), 1);
}

#[tokio::test]
async fn test_unknown_tool_rejected() {
    let (_tmp, dispatcher) = create_test_dispatcher(SecurityPolicy::default());
    let err = dispatcher
        .call_tool("delete_everything", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SolveItError::UnknownTool(_)));
    assert!(!err.is_security_violation());
}

#[tokio::test]
async fn test_missing_parameter_is_invalid_params() {
    let (_tmp, dispatcher) = create_test_dispatcher(SecurityPolicy::default());
    let err = dispatcher
        .call_tool("get_weakness_details", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SolveItError::InvalidParams(_)));
}

#[tokio::test]
async fn test_long_timeout_capped_at_policy_maximum() {
    let calls = Arc::new(AtomicUsize::new(0));
    let policy = SecurityPolicy::default();
    let profile = ToolSecurityProfile {
        requested_timeout_seconds: Some(400.0),
        allow_long_execution: true,
        ..ToolSecurityProfile::default()
    };
    let (_tmp, dispatcher) = create_custom_dispatcher(
        vec![counting_tool("slow_report", profile.clone(), "done", Arc::clone(&calls))],
        policy.clone(),
    );

    let out = dispatcher.call_tool("slow_report", json!({})).await.unwrap();
    assert_eq!(out, "done");
    assert_eq!(count(&calls), 1);
    assert_eq!(dispatcher.security().governor().capped_calls(), 1);

    let decision = dispatcher
        .security()
        .governor()
        .decide("slow_report", profile.requested_timeout(&policy));
    assert_eq!(decision.requested, Duration::from_secs(400));
    assert_eq!(decision.effective, Duration::from_secs(300));
    assert!(decision.capped);
}

#[tokio::test]
async fn test_stalled_tool_times_out() {
    let policy = SecurityPolicy::default();
    let mut registry = solveit_core::ToolRegistry::new();
    registry
        .register(
            solveit_core::ToolDefinition::new(
                "stall",
                "Never finishes in time",
                json!({"type": "object", "properties": {}}),
                ToolSecurityProfile {
                    requested_timeout_seconds: Some(0.05),
                    ..ToolSecurityProfile::default()
                },
                |_, _| {
                    std::thread::sleep(Duration::from_millis(500));
                    Ok("late".to_string())
                },
            ),
            &policy,
        )
        .unwrap();

    let (_tmp, data) = common::create_test_data();
    let dispatcher = solveit_core::Dispatcher::new(
        registry,
        solveit_core::SecurityMiddleware::new(policy),
        common::load_knowledge_base(&data),
    );

    let result = dispatcher.call_tool("stall", json!({})).await;
    assert!(matches!(
        violation(result),
        SecurityViolation::ExecutionTimeout { seconds } if (seconds - 0.05).abs() < 1e-9
    ));
}

#[tokio::test]
async fn test_output_budget_shared_across_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let policy = SecurityPolicy {
        output_bytes_rate_per_minute: 250,
        ..SecurityPolicy::default()
    };
    let (_tmp, dispatcher) = create_custom_dispatcher(
        vec![counting_tool(
            "hundred",
            ToolSecurityProfile::default(),
            &"x".repeat(100),
            Arc::clone(&calls),
        )],
        policy.clone(),
    );

    dispatcher.call_tool("hundred", json!({})).await.unwrap();
    dispatcher.call_tool("hundred", json!({})).await.unwrap();

    let third = dispatcher.call_tool("hundred", json!({})).await;
    assert_eq!(
        violation(third),
        SecurityViolation::OutputRateLimitExceeded { size: 100 }
    );
    // The tool ran; only its output was withheld
    assert_eq!(count(&calls), 3);
}

#[tokio::test]
async fn test_oversized_output_truncated() {
    let policy = SecurityPolicy {
        max_output_bytes: 64,
        ..SecurityPolicy::default()
    };
    let (_tmp, dispatcher) = create_test_dispatcher(policy);

    let out = dispatcher
        .call_tool("get_all_techniques_with_full_detail", json!({}))
        .await
        .unwrap();
    assert!(out.ends_with("[OUTPUT TRUNCATED - SIZE LIMIT EXCEEDED]"));
    assert!(out.starts_with('['));
}

#[tokio::test]
async fn test_objective_mapping_switch() {
    let (_tmp, dispatcher) = create_test_dispatcher(SecurityPolicy::default());

    let out = dispatcher
        .call_tool("list_available_mappings", json!({}))
        .await
        .unwrap();
    assert!(out.contains("carrier.json"));
    assert!(out.contains("solve-it.json"));

    let out = dispatcher
        .call_tool("load_objective_mapping", json!({"filename": "carrier.json"}))
        .await
        .unwrap();
    let status: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(status["success"], true);
    assert_eq!(status["current_mapping"], "carrier.json");

    let out = dispatcher
        .call_tool("get_techniques_for_objective", json!({"objective_name": "Preserve"}))
        .await
        .unwrap();
    assert!(out.contains("T1002"));
    assert!(!out.contains("T1001"));
}
