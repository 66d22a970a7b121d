//! MCP tool registry
//!
//! Twenty read-only tools over the SOLVE-IT knowledge base:
//! - DESCRIBE: get_database_description, search
//! - DETAIL: get_{technique,weakness,mitigation}_details
//! - RELATE: the five relationship lookups
//! - OBJECTIVES: list_objectives, get_techniques_for_objective,
//!   list_available_mappings, load_objective_mapping
//! - BULK: get_all_* in name/id and full-detail forms
//!
//! Each tool is a name, a JSON Schema, a security profile and a plain
//! function over `&dyn KnowledgeBase`. Profiles are validated when the
//! registry is built.

use crate::error::{ConfigError, Result, SolveItError};
use crate::knowledge::KnowledgeBase;
use crate::security::{SecurityPolicy, ToolSecurityProfile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Tool schema definition as advertised by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (e.g., "get_technique_details")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Invocation function: arguments in, text out
pub type InvokeFn = Arc<dyn Fn(&dyn KnowledgeBase, Value) -> Result<String> + Send + Sync>;

/// A registered tool
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub profile: ToolSecurityProfile,
    invoke: InvokeFn,
}

impl ToolDefinition {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        profile: ToolSecurityProfile,
        invoke: F,
    ) -> Self
    where
        F: Fn(&dyn KnowledgeBase, Value) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            profile,
            invoke: Arc::new(invoke),
        }
    }

    /// Knowledge base tool with the shared 45 second profile
    fn knowledge_base<F>(name: &str, description: &str, input_schema: Value, invoke: F) -> Self
    where
        F: Fn(&dyn KnowledgeBase, Value) -> Result<String> + Send + Sync + 'static,
    {
        Self::new(
            name,
            description,
            input_schema,
            ToolSecurityProfile::knowledge_base(),
            invoke,
        )
    }

    /// Handle to the invocation function, for running off the async executor
    pub fn invoker(&self) -> InvokeFn {
        Arc::clone(&self.invoke)
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn describe(&self) -> Tool {
        Tool {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

/// Name-indexed set of tools, in registration order
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The SOLVE-IT tool catalogue, validated against `policy`
    pub fn solveit(policy: &SecurityPolicy) -> std::result::Result<Self, ConfigError> {
        let mut registry = Self::new();
        for tool in solveit_tools() {
            registry.register(tool, policy)?;
        }
        info!(tools = registry.len(), "Tool registry built");
        Ok(registry)
    }

    /// Add a tool after checking its profile; duplicate names are rejected
    pub fn register(
        &mut self,
        tool: ToolDefinition,
        policy: &SecurityPolicy,
    ) -> std::result::Result<(), ConfigError> {
        if self.get(&tool.name).is_some() {
            error!(tool_name = %tool.name, "Duplicate tool registration");
            return Err(ConfigError::InvalidProfile {
                tool: tool.name,
                reason: "a tool with this name is already registered".to_string(),
            });
        }

        tool.profile.validate(&tool.name, policy, &tool.param_names())?;
        debug!(tool_name = %tool.name, "Registered tool");
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn list(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDefinition::describe).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchParams {
    keywords: String,
    #[serde(default)]
    item_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TechniqueParams {
    technique_id: String,
}

#[derive(Debug, Deserialize)]
struct WeaknessParams {
    weakness_id: String,
}

#[derive(Debug, Deserialize)]
struct MitigationParams {
    mitigation_id: String,
}

#[derive(Debug, Deserialize)]
struct ObjectiveParams {
    objective_name: String,
}

#[derive(Debug, Deserialize)]
struct MappingParams {
    filename: String,
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|e| SolveItError::InvalidParams(e.to_string()))
}

fn no_params() -> Value {
    json!({"type": "object", "properties": {}})
}

fn string_param(field: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            field: {"type": "string", "description": description}
        },
        "required": [field]
    })
}

// ============================================================================
// Output shaping
// ============================================================================

/// User-facing text for a failed knowledge base call; details go to the log
pub fn knowledge_base_error_text(err: &SolveItError, operation: &str) -> String {
    error!(operation, error = %err, "Knowledge base operation failed");

    let message = err.to_string().to_lowercase();
    if matches!(err, SolveItError::NotFound(_)) || message.contains("not found") {
        format!(
            "Item not found during {}. Please check the ID and try again.",
            operation
        )
    } else if matches!(err, SolveItError::InvalidParams(_)) || message.contains("invalid") {
        format!(
            "Invalid input for {}. Please check your parameters.",
            operation
        )
    } else {
        format!(
            "An error occurred during {}. Please try again or contact support.",
            operation
        )
    }
}

fn pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Serialize a successful lookup, or turn its failure into text
fn respond<T: Serialize>(outcome: Result<T>, operation: &str) -> Result<String> {
    match outcome {
        Ok(value) => pretty(&value),
        Err(e) => Ok(knowledge_base_error_text(&e, operation)),
    }
}

fn respond_detail(outcome: Result<Option<Value>>, label: &str, id: &str) -> Result<String> {
    match outcome {
        Ok(Some(item)) => pretty(&item),
        Ok(None) => Ok(format!("{} {} not found.", label, id)),
        Err(e) => Ok(knowledge_base_error_text(
            &e,
            &format!("{} {} retrieval", label.to_lowercase(), id),
        )),
    }
}

// ============================================================================
// Tool implementations
// ============================================================================

fn database_description(kb: &dyn KnowledgeBase, _args: Value) -> Result<String> {
    let stats = (|| -> Result<Value> {
        Ok(json!({
            "techniques": kb.list_techniques()?.len(),
            "weaknesses": kb.list_weaknesses()?.len(),
            "mitigations": kb.list_mitigations()?.len(),
            "objectives": kb.list_objectives()?.len(),
            "current_mapping": kb.current_mapping_name(),
        }))
    })();

    let stats = match stats {
        Ok(stats) => stats,
        Err(e) => {
            return Ok(knowledge_base_error_text(
                &e,
                "database description retrieval",
            ))
        }
    };

    pretty(&json!({
        "database_name": "SOLVE-IT Digital Forensics Knowledge Base",
        "description": "A systematic digital forensics knowledge base inspired by MITRE ATT&CK",
        "purpose": "Provides comprehensive mapping of digital forensic investigation techniques, weaknesses, and mitigations",
        "components": {
            "techniques": "Digital forensic investigation methods (T1001, T1002, etc.)",
            "weaknesses": "Potential problems/limitations of techniques (W1001, W1002, etc.)",
            "mitigations": "Ways to address weaknesses (M1001, M1002, etc.)",
            "objectives": "Categories that organize techniques by investigation goals"
        },
        "statistics": stats,
        "mcp_server_role": "This MCP server provides LLMs with programmatic access to the SOLVE-IT knowledge base through validated, rate-limited tools",
        "available_operations": [
            "Search across techniques, weaknesses, and mitigations",
            "Retrieve detailed information by ID",
            "Explore relationships between components",
            "Work with different objective mappings",
            "Bulk retrieval operations"
        ]
    }))
}

fn search(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let params: SearchParams = parse(args)?;
    respond(kb.search(&params.keywords, params.item_types), "search operation")
}

fn technique_details(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let p: TechniqueParams = parse(args)?;
    respond_detail(kb.get_technique(&p.technique_id), "Technique", &p.technique_id)
}

fn weakness_details(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let p: WeaknessParams = parse(args)?;
    respond_detail(kb.get_weakness(&p.weakness_id), "Weakness", &p.weakness_id)
}

fn mitigation_details(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let p: MitigationParams = parse(args)?;
    respond_detail(kb.get_mitigation(&p.mitigation_id), "Mitigation", &p.mitigation_id)
}

fn weaknesses_for_technique(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let p: TechniqueParams = parse(args)?;
    respond(
        kb.get_weaknesses_for_technique(&p.technique_id),
        &format!("weaknesses for technique {}", p.technique_id),
    )
}

fn mitigations_for_weakness(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let p: WeaknessParams = parse(args)?;
    respond(
        kb.get_mitigations_for_weakness(&p.weakness_id),
        &format!("mitigations for weakness {}", p.weakness_id),
    )
}

fn techniques_for_weakness(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let p: WeaknessParams = parse(args)?;
    respond(
        kb.get_techniques_for_weakness(&p.weakness_id),
        &format!("techniques for weakness {}", p.weakness_id),
    )
}

fn weaknesses_for_mitigation(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let p: MitigationParams = parse(args)?;
    respond(
        kb.get_weaknesses_for_mitigation(&p.mitigation_id),
        &format!("weaknesses for mitigation {}", p.mitigation_id),
    )
}

fn techniques_for_mitigation(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let p: MitigationParams = parse(args)?;
    respond(
        kb.get_techniques_for_mitigation(&p.mitigation_id),
        &format!("techniques for mitigation {}", p.mitigation_id),
    )
}

fn list_objectives(kb: &dyn KnowledgeBase, _args: Value) -> Result<String> {
    respond(kb.list_objectives(), "objectives listing")
}

fn techniques_for_objective(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let p: ObjectiveParams = parse(args)?;
    respond(
        kb.get_techniques_for_objective(&p.objective_name),
        &format!("techniques for objective {}", p.objective_name),
    )
}

fn list_available_mappings(kb: &dyn KnowledgeBase, _args: Value) -> Result<String> {
    respond(kb.list_available_mappings(), "available mappings listing")
}

fn load_objective_mapping(kb: &dyn KnowledgeBase, args: Value) -> Result<String> {
    let p: MappingParams = parse(args)?;
    let operation = format!("loading mapping {}", p.filename);

    match kb.load_objective_mapping(&p.filename) {
        Ok(true) => pretty(&json!({
            "success": true,
            "message": format!("Successfully loaded mapping: {}", p.filename),
            "current_mapping": p.filename,
        })),
        Ok(false) => pretty(&json!({
            "success": false,
            "message": format!("Failed to load mapping: {}", p.filename),
            "current_mapping": kb.current_mapping_name(),
        })),
        Err(e) => Ok(knowledge_base_error_text(&e, &operation)),
    }
}

fn solveit_tools() -> Vec<ToolDefinition> {
    vec![
        // DESCRIBE
        ToolDefinition::knowledge_base(
            "get_database_description",
            "Returns a comprehensive description of the SOLVE-IT database and the role of this MCP server.",
            no_params(),
            database_description,
        ),
        ToolDefinition::knowledge_base(
            "search",
            "Searches the knowledge base for techniques, weaknesses, or mitigations matching specified keywords.",
            json!({
                "type": "object",
                "properties": {
                    "keywords": {
                        "type": "string",
                        "description": "Keywords to search for. Use quotes for exact phrases."
                    },
                    "item_types": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Types of items to search ('techniques', 'weaknesses', 'mitigations'). If omitted, searches all types."
                    }
                },
                "required": ["keywords"]
            }),
            search,
        ),
        // DETAIL
        ToolDefinition::knowledge_base(
            "get_technique_details",
            "Retrieves the full details for a specific SOLVE-IT technique by its ID (e.g., T1002).",
            string_param("technique_id", "The ID of the technique (e.g., T1002)"),
            technique_details,
        ),
        ToolDefinition::knowledge_base(
            "get_weakness_details",
            "Retrieves additional, optional details for a specific SOLVE-IT weakness by its ID (e.g., W1001). The 'name' field contains the primary description of what this weakness entails.",
            string_param("weakness_id", "The ID of the weakness (e.g., W1001)"),
            weakness_details,
        ),
        ToolDefinition::knowledge_base(
            "get_mitigation_details",
            "Retrieves additional, optional details for a specific SOLVE-IT mitigation by its ID (e.g., M1001). The 'name' field contains the primary description of what this mitigation entails.",
            string_param("mitigation_id", "The ID of the mitigation (e.g., M1001)"),
            mitigation_details,
        ),
        // RELATE
        ToolDefinition::knowledge_base(
            "get_weaknesses_for_technique",
            "Retrieves all weaknesses associated with a specific SOLVE-IT technique ID.",
            string_param("technique_id", "The ID of the technique (e.g., T1002)"),
            weaknesses_for_technique,
        ),
        ToolDefinition::knowledge_base(
            "get_mitigations_for_weakness",
            "Retrieves all mitigations associated with a specific SOLVE-IT weakness ID.",
            string_param("weakness_id", "The ID of the weakness (e.g., W1001)"),
            mitigations_for_weakness,
        ),
        ToolDefinition::knowledge_base(
            "get_techniques_for_weakness",
            "Retrieves all techniques that reference a specific SOLVE-IT weakness ID.",
            string_param("weakness_id", "The ID of the weakness (e.g., W1001)"),
            techniques_for_weakness,
        ),
        ToolDefinition::knowledge_base(
            "get_weaknesses_for_mitigation",
            "Retrieves all weaknesses that reference a specific SOLVE-IT mitigation ID.",
            string_param("mitigation_id", "The ID of the mitigation (e.g., M1001)"),
            weaknesses_for_mitigation,
        ),
        ToolDefinition::knowledge_base(
            "get_techniques_for_mitigation",
            "Retrieves all techniques that reference a specific SOLVE-IT mitigation ID (through weaknesses).",
            string_param("mitigation_id", "The ID of the mitigation (e.g., M1001)"),
            techniques_for_mitigation,
        ),
        // OBJECTIVES
        ToolDefinition::knowledge_base(
            "list_objectives",
            "Lists all objectives from the current SOLVE-IT objective mapping.",
            no_params(),
            list_objectives,
        ),
        ToolDefinition::knowledge_base(
            "get_techniques_for_objective",
            "Retrieves all techniques associated with a specific SOLVE-IT objective name.",
            string_param("objective_name", "The name of the objective"),
            techniques_for_objective,
        ),
        ToolDefinition::knowledge_base(
            "list_available_mappings",
            "Lists all available SOLVE-IT objective mapping files (solve-it.json, carrier.json, etc.).",
            no_params(),
            list_available_mappings,
        ),
        ToolDefinition::knowledge_base(
            "load_objective_mapping",
            "Switches to a different SOLVE-IT objective mapping file.",
            string_param("filename", "Mapping file name (e.g., carrier.json)"),
            load_objective_mapping,
        ),
        // BULK (concise)
        ToolDefinition::knowledge_base(
            "get_all_techniques_with_name_and_id",
            "Retrieves all SOLVE-IT techniques with ID and name only (concise format).",
            no_params(),
            |kb, _| respond(kb.get_all_techniques_with_name_and_id(), "all techniques with name and ID"),
        ),
        ToolDefinition::knowledge_base(
            "get_all_weaknesses_with_name_and_id",
            "Retrieves all SOLVE-IT weaknesses with ID and name only (concise format).",
            no_params(),
            |kb, _| respond(kb.get_all_weaknesses_with_name_and_id(), "all weaknesses with name and ID"),
        ),
        ToolDefinition::knowledge_base(
            "get_all_mitigations_with_name_and_id",
            "Retrieves all SOLVE-IT mitigations with ID and name only (concise format).",
            no_params(),
            |kb, _| respond(kb.get_all_mitigations_with_name_and_id(), "all mitigations with name and ID"),
        ),
        // BULK (full)
        ToolDefinition::knowledge_base(
            "get_all_techniques_with_full_detail",
            "Retrieves all SOLVE-IT techniques with complete details. Warning: May return large amounts of data.",
            no_params(),
            |kb, _| respond(kb.get_all_techniques_with_full_detail(), "all techniques with full detail"),
        ),
        ToolDefinition::knowledge_base(
            "get_all_weaknesses_with_full_detail",
            "Retrieves all SOLVE-IT weaknesses with complete details. Warning: May return large amounts of data.",
            no_params(),
            |kb, _| respond(kb.get_all_weaknesses_with_full_detail(), "all weaknesses with full detail"),
        ),
        ToolDefinition::knowledge_base(
            "get_all_mitigations_with_full_detail",
            "Retrieves all SOLVE-IT mitigations with complete details. Warning: May return large amounts of data.",
            no_params(),
            |kb, _| respond(kb.get_all_mitigations_with_full_detail(), "all mitigations with full detail"),
        ),
    ]
}
