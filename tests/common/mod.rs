//! Common test utilities and helpers

#![allow(dead_code)]

use serde_json::{json, Value};
use solveit_core::{
    Dispatcher, JsonKnowledgeBase, SecurityMiddleware, SecurityPolicy, ToolDefinition,
    ToolRegistry, ToolSecurityProfile,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn write(path: PathBuf, value: Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

/// A small SOLVE-IT checkout: `<tmp>/data/{techniques,weaknesses,mitigations}`
/// plus `solve-it.json` in the data directory and `carrier.json` beside it.
pub fn create_test_data() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");

    write(
        data.join("techniques/T1001.json"),
        json!({
            "id": "T1001",
            "name": "Disk imaging",
            "description": "Create a forensic image of a storage device",
            "weaknesses": ["W1001", "W1002"]
        }),
    );
    write(
        data.join("techniques/T1002.json"),
        json!({
            "id": "T1002",
            "name": "Memory acquisition",
            "description": "Capture volatile memory from a running system",
            "weaknesses": ["W1002"]
        }),
    );
    write(
        data.join("weaknesses/W1001.json"),
        json!({
            "id": "W1001",
            "name": "Imaging misses host protected areas",
            "mitigations": ["M1001"]
        }),
    );
    write(
        data.join("weaknesses/W1002.json"),
        json!({
            "id": "W1002",
            "name": "Acquisition tool alters evidence",
            "mitigations": ["M1001", "M1002"]
        }),
    );
    write(
        data.join("mitigations/M1001.json"),
        json!({"id": "M1001", "name": "Use a hardware write blocker"}),
    );
    write(
        data.join("mitigations/M1002.json"),
        json!({"id": "M1002", "name": "Verify acquisition hashes"}),
    );
    write(
        data.join("solve-it.json"),
        json!([
            {"name": "Acquire data", "description": "Obtain the evidence", "techniques": ["T1001", "T1002"]},
            {"name": "Report", "techniques": []}
        ]),
    );
    write(tmp.path().join("carrier.json"), json!({"Preserve": ["T1002"]}));

    (tmp, data)
}

pub fn load_knowledge_base(data: &Path) -> Arc<JsonKnowledgeBase> {
    Arc::new(JsonKnowledgeBase::load(data, "solve-it.json").expect("fixture loads"))
}

/// Dispatcher over the fixture data with the full SOLVE-IT catalogue
pub fn create_test_dispatcher(policy: SecurityPolicy) -> (TempDir, Dispatcher) {
    let (tmp, data) = create_test_data();
    let registry = ToolRegistry::solveit(&policy).unwrap();
    let dispatcher = Dispatcher::new(
        registry,
        SecurityMiddleware::new(policy),
        load_knowledge_base(&data),
    );
    (tmp, dispatcher)
}

/// Tool that counts its invocations and echoes a fixed payload
pub fn counting_tool(
    name: &str,
    profile: ToolSecurityProfile,
    payload: &str,
    calls: Arc<AtomicUsize>,
) -> ToolDefinition {
    let payload = payload.to_string();
    ToolDefinition::new(
        name,
        "Counts invocations",
        json!({"type": "object", "properties": {"value": {"type": "string"}}}),
        profile,
        move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(payload.clone())
        },
    )
}

/// Dispatcher whose only tools are `extra`
pub fn create_custom_dispatcher(
    extra: Vec<ToolDefinition>,
    policy: SecurityPolicy,
) -> (TempDir, Dispatcher) {
    let (tmp, data) = create_test_data();
    let mut registry = ToolRegistry::new();
    for tool in extra {
        registry.register(tool, &policy).unwrap();
    }
    let dispatcher = Dispatcher::new(
        registry,
        SecurityMiddleware::new(policy),
        load_knowledge_base(&data),
    );
    (tmp, dispatcher)
}

pub fn count(calls: &AtomicUsize) -> usize {
    calls.load(Ordering::SeqCst)
}
