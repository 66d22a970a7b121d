//! Knowledge base layer
//!
//! The SOLVE-IT knowledge base holds techniques (T####), weaknesses (W####)
//! and mitigations (M####), plus objective mappings that group techniques by
//! investigation goal. Tools only ever read from it; the one piece of mutable
//! state is which objective mapping is current.

pub mod data_path;
pub mod json_store;

use crate::error::Result;
use serde_json::Value;

pub use json_store::JsonKnowledgeBase;

/// Mapping loaded when the server starts
pub const DEFAULT_MAPPING_FILE: &str = "solve-it.json";

/// Synchronous query interface consumed by the tool layer.
///
/// Lookups return `Ok(None)` or an empty list for unknown IDs; `Err` is
/// reserved for genuine failures.
#[cfg_attr(test, mockall::automock)]
pub trait KnowledgeBase: Send + Sync {
    /// Keyword search; the result maps each category to its matching items
    fn search(&self, keywords: &str, item_types: Option<Vec<String>>) -> Result<Value>;

    fn get_technique(&self, id: &str) -> Result<Option<Value>>;

    fn get_weakness(&self, id: &str) -> Result<Option<Value>>;

    fn get_mitigation(&self, id: &str) -> Result<Option<Value>>;

    fn get_weaknesses_for_technique(&self, technique_id: &str) -> Result<Vec<Value>>;

    fn get_mitigations_for_weakness(&self, weakness_id: &str) -> Result<Vec<Value>>;

    fn get_techniques_for_weakness(&self, weakness_id: &str) -> Result<Vec<Value>>;

    fn get_weaknesses_for_mitigation(&self, mitigation_id: &str) -> Result<Vec<Value>>;

    /// Techniques reached through the weaknesses a mitigation addresses
    fn get_techniques_for_mitigation(&self, mitigation_id: &str) -> Result<Vec<Value>>;

    /// Objectives of the current mapping
    fn list_objectives(&self) -> Result<Vec<Value>>;

    fn get_techniques_for_objective(&self, objective_name: &str) -> Result<Vec<Value>>;

    /// Mapping file names that `load_objective_mapping` accepts
    fn list_available_mappings(&self) -> Result<Vec<String>>;

    /// Switch the current mapping; `Ok(false)` when the file cannot be used
    fn load_objective_mapping(&self, filename: &str) -> Result<bool>;

    fn current_mapping_name(&self) -> String;

    fn list_techniques(&self) -> Result<Vec<String>>;

    fn list_weaknesses(&self) -> Result<Vec<String>>;

    fn list_mitigations(&self) -> Result<Vec<String>>;

    fn get_all_techniques_with_name_and_id(&self) -> Result<Vec<Value>>;

    fn get_all_weaknesses_with_name_and_id(&self) -> Result<Vec<Value>>;

    fn get_all_mitigations_with_name_and_id(&self) -> Result<Vec<Value>>;

    fn get_all_techniques_with_full_detail(&self) -> Result<Vec<Value>>;

    fn get_all_weaknesses_with_full_detail(&self) -> Result<Vec<Value>>;

    fn get_all_mitigations_with_full_detail(&self) -> Result<Vec<Value>>;
}

/// Item categories accepted by `search`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Technique,
    Weakness,
    Mitigation,
}

impl ItemType {
    pub const ALL: [ItemType; 3] = [ItemType::Technique, ItemType::Weakness, ItemType::Mitigation];

    /// Key used in search results and in the `item_types` parameter
    pub fn plural(&self) -> &'static str {
        match self {
            ItemType::Technique => "techniques",
            ItemType::Weakness => "weaknesses",
            ItemType::Mitigation => "mitigations",
        }
    }

    /// Accepts singular or plural, any case
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "technique" | "techniques" => Some(ItemType::Technique),
            "weakness" | "weaknesses" => Some(ItemType::Weakness),
            "mitigation" | "mitigations" => Some(ItemType::Mitigation),
            _ => None,
        }
    }
}
