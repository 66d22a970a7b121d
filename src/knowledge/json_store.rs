//! Knowledge base backed by a SOLVE-IT data directory on disk.
//!
//! Layout:
//! ```text
//! data/
//!     techniques/T1001.json     {"id": "T1001", "name": ..., "weaknesses": ["W1001", ...]}
//!     weaknesses/W1001.json     {"id": "W1001", "name": ..., "mitigations": ["M1001", ...]}
//!     mitigations/M1001.json    {"id": "M1001", "name": ...}
//!     solve-it.json             objective mapping
//! ```
//! Mapping files live in the data directory or its parent. Everything is read
//! once at load; only the current mapping can change afterwards.

use super::data_path;
use super::{ItemType, KnowledgeBase};
use crate::error::{Result, SolveItError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

static QUOTED_PHRASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)""#).expect("static phrase pattern"));

/// One entry of an objective mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub techniques: Vec<String>,
}

/// Mapping files come in two shapes
#[derive(Deserialize)]
#[serde(untagged)]
enum MappingFile {
    List(Vec<Objective>),
    Map(BTreeMap<String, Vec<String>>),
}

impl MappingFile {
    fn into_objectives(self) -> Vec<Objective> {
        match self {
            MappingFile::List(objectives) => objectives,
            MappingFile::Map(map) => map
                .into_iter()
                .map(|(name, techniques)| Objective {
                    name,
                    description: String::new(),
                    techniques,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ObjectiveMapping {
    name: String,
    objectives: Vec<Objective>,
}

pub struct JsonKnowledgeBase {
    data_path: PathBuf,
    techniques: BTreeMap<String, Value>,
    weaknesses: BTreeMap<String, Value>,
    mitigations: BTreeMap<String, Value>,
    techniques_by_weakness: BTreeMap<String, BTreeSet<String>>,
    weaknesses_by_mitigation: BTreeMap<String, BTreeSet<String>>,
    mapping: RwLock<ObjectiveMapping>,
}

impl JsonKnowledgeBase {
    /// Load every item under `data_path` and the named objective mapping
    pub fn load(data_path: impl AsRef<Path>, mapping_file: &str) -> Result<Self> {
        let data_path = data_path.as_ref().to_path_buf();
        data_path::validate(&data_path)?;

        let techniques = load_items(&data_path.join("techniques"))?;
        let weaknesses = load_items(&data_path.join("weaknesses"))?;
        let mitigations = load_items(&data_path.join("mitigations"))?;

        let techniques_by_weakness = reverse_index(&techniques, "weaknesses");
        let weaknesses_by_mitigation = reverse_index(&weaknesses, "mitigations");

        let kb = Self {
            data_path,
            techniques,
            weaknesses,
            mitigations,
            techniques_by_weakness,
            weaknesses_by_mitigation,
            mapping: RwLock::new(ObjectiveMapping {
                name: mapping_file.to_string(),
                objectives: Vec::new(),
            }),
        };

        if !kb.load_objective_mapping(mapping_file)? {
            warn!(mapping_file, "Objective mapping not loaded; objective tools will return empty results");
        }

        info!(
            techniques = kb.techniques.len(),
            weaknesses = kb.weaknesses.len(),
            mitigations = kb.mitigations.len(),
            mapping = mapping_file,
            "Knowledge base loaded from {}",
            kb.data_path.display()
        );

        Ok(kb)
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    fn find_mapping(&self, filename: &str) -> Option<PathBuf> {
        // Plain file names only; no separators or parent components
        let is_plain = Path::new(filename).file_name().and_then(|n| n.to_str()) == Some(filename);
        if !is_plain || !filename.ends_with(".json") {
            return None;
        }

        data_path::mapping_dirs(&self.data_path)
            .into_iter()
            .map(|dir| dir.join(filename))
            .find(|p| p.is_file())
    }

    fn lookup_all(&self, store: &BTreeMap<String, Value>, ids: &[&str]) -> Vec<Value> {
        ids.iter().filter_map(|id| store.get(*id).cloned()).collect()
    }
}

fn load_items(dir: &Path) -> Result<BTreeMap<String, Value>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort();

    let mut items = BTreeMap::new();
    for path in files {
        let parsed = fs::read_to_string(&path)
            .map_err(SolveItError::from)
            .and_then(|text| serde_json::from_str::<Value>(&text).map_err(SolveItError::from));

        let item = match parsed {
            Ok(item) => item,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable item file");
                continue;
            }
        };

        let id = item
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(str::to_string));

        match id {
            Some(id) if item.is_object() => {
                items.insert(id, item);
            }
            _ => warn!(file = %path.display(), "Skipping item file without an object body"),
        }
    }

    debug!(dir = %dir.display(), count = items.len(), "Loaded items");
    Ok(items)
}

fn id_list<'a>(item: &'a Value, field: &str) -> Vec<&'a str> {
    item.get(field)
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// For every id listed in `field` of an item, the set of items listing it
fn reverse_index(items: &BTreeMap<String, Value>, field: &str) -> BTreeMap<String, BTreeSet<String>> {
    let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (id, item) in items {
        for target in id_list(item, field) {
            index.entry(target.to_string()).or_default().insert(id.clone());
        }
    }
    index
}

fn name_and_id(items: &BTreeMap<String, Value>) -> Vec<Value> {
    items
        .iter()
        .map(|(id, item)| {
            json!({
                "id": id,
                "name": item.get("name").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

/// Quoted phrases and bare terms, lowercased
fn parse_query(keywords: &str) -> Vec<String> {
    let mut needles: Vec<String> = QUOTED_PHRASE
        .captures_iter(keywords)
        .map(|c| c[1].trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    let remainder = QUOTED_PHRASE.replace_all(keywords, " ");
    needles.extend(remainder.split_whitespace().map(str::to_lowercase));
    needles
}

fn matches_all(item: &Value, needles: &[String]) -> bool {
    let haystack = item.to_string().to_lowercase();
    needles.iter().all(|n| haystack.contains(n.as_str()))
}

impl KnowledgeBase for JsonKnowledgeBase {
    fn search(&self, keywords: &str, item_types: Option<Vec<String>>) -> Result<Value> {
        let needles = parse_query(keywords);
        let wanted: BTreeSet<&'static str> = match &item_types {
            Some(names) => names
                .iter()
                .filter_map(|n| ItemType::parse(n))
                .map(|t| t.plural())
                .collect(),
            None => ItemType::ALL.iter().map(ItemType::plural).collect(),
        };

        let mut results = serde_json::Map::new();
        for item_type in ItemType::ALL {
            let store = match item_type {
                ItemType::Technique => &self.techniques,
                ItemType::Weakness => &self.weaknesses,
                ItemType::Mitigation => &self.mitigations,
            };

            let hits: Vec<Value> = if needles.is_empty() || !wanted.contains(item_type.plural()) {
                Vec::new()
            } else {
                store
                    .values()
                    .filter(|item| matches_all(item, &needles))
                    .cloned()
                    .collect()
            };
            results.insert(item_type.plural().to_string(), Value::Array(hits));
        }

        debug!(keywords, terms = needles.len(), "Search completed");
        Ok(Value::Object(results))
    }

    fn get_technique(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.techniques.get(id).cloned())
    }

    fn get_weakness(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.weaknesses.get(id).cloned())
    }

    fn get_mitigation(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.mitigations.get(id).cloned())
    }

    fn get_weaknesses_for_technique(&self, technique_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .techniques
            .get(technique_id)
            .map(|t| self.lookup_all(&self.weaknesses, &id_list(t, "weaknesses")))
            .unwrap_or_default())
    }

    fn get_mitigations_for_weakness(&self, weakness_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .weaknesses
            .get(weakness_id)
            .map(|w| self.lookup_all(&self.mitigations, &id_list(w, "mitigations")))
            .unwrap_or_default())
    }

    fn get_techniques_for_weakness(&self, weakness_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .techniques_by_weakness
            .get(weakness_id)
            .map(|ids| ids.iter().filter_map(|id| self.techniques.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    fn get_weaknesses_for_mitigation(&self, mitigation_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .weaknesses_by_mitigation
            .get(mitigation_id)
            .map(|ids| ids.iter().filter_map(|id| self.weaknesses.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    fn get_techniques_for_mitigation(&self, mitigation_id: &str) -> Result<Vec<Value>> {
        let technique_ids: BTreeSet<&String> = self
            .weaknesses_by_mitigation
            .get(mitigation_id)
            .into_iter()
            .flatten()
            .filter_map(|w| self.techniques_by_weakness.get(w))
            .flatten()
            .collect();

        Ok(technique_ids
            .into_iter()
            .filter_map(|id| self.techniques.get(id).cloned())
            .collect())
    }

    fn list_objectives(&self) -> Result<Vec<Value>> {
        let mapping = self.mapping.read().unwrap_or_else(PoisonError::into_inner);
        mapping
            .objectives
            .iter()
            .map(|o| serde_json::to_value(o).map_err(SolveItError::from))
            .collect()
    }

    fn get_techniques_for_objective(&self, objective_name: &str) -> Result<Vec<Value>> {
        let mapping = self.mapping.read().unwrap_or_else(PoisonError::into_inner);
        Ok(mapping
            .objectives
            .iter()
            .find(|o| o.name == objective_name)
            .map(|o| {
                o.techniques
                    .iter()
                    .filter_map(|id| self.techniques.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_available_mappings(&self) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        for dir in data_path::mapping_dirs(&self.data_path) {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for path in entries.filter_map(|e| e.ok().map(|e| e.path())) {
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let is_mapping = fs::read_to_string(&path)
                    .ok()
                    .and_then(|text| serde_json::from_str::<MappingFile>(&text).ok())
                    .is_some();
                if let (true, Some(name)) = (is_mapping, path.file_name().and_then(|n| n.to_str())) {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    fn load_objective_mapping(&self, filename: &str) -> Result<bool> {
        let Some(path) = self.find_mapping(filename) else {
            warn!(filename, "Mapping file not found");
            return Ok(false);
        };

        let parsed = fs::read_to_string(&path)
            .map_err(SolveItError::from)
            .and_then(|text| serde_json::from_str::<MappingFile>(&text).map_err(SolveItError::from));

        let objectives = match parsed {
            Ok(file) => file.into_objectives(),
            Err(e) => {
                warn!(filename, error = %e, "Mapping file could not be parsed");
                return Ok(false);
            }
        };

        let mut mapping = self.mapping.write().unwrap_or_else(PoisonError::into_inner);
        info!(
            filename,
            objectives = objectives.len(),
            previous = %mapping.name,
            "Objective mapping loaded"
        );
        *mapping = ObjectiveMapping {
            name: filename.to_string(),
            objectives,
        };
        Ok(true)
    }

    fn current_mapping_name(&self) -> String {
        self.mapping
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .name
            .clone()
    }

    fn list_techniques(&self) -> Result<Vec<String>> {
        Ok(self.techniques.keys().cloned().collect())
    }

    fn list_weaknesses(&self) -> Result<Vec<String>> {
        Ok(self.weaknesses.keys().cloned().collect())
    }

    fn list_mitigations(&self) -> Result<Vec<String>> {
        Ok(self.mitigations.keys().cloned().collect())
    }

    fn get_all_techniques_with_name_and_id(&self) -> Result<Vec<Value>> {
        Ok(name_and_id(&self.techniques))
    }

    fn get_all_weaknesses_with_name_and_id(&self) -> Result<Vec<Value>> {
        Ok(name_and_id(&self.weaknesses))
    }

    fn get_all_mitigations_with_name_and_id(&self) -> Result<Vec<Value>> {
        Ok(name_and_id(&self.mitigations))
    }

    fn get_all_techniques_with_full_detail(&self) -> Result<Vec<Value>> {
        Ok(self.techniques.values().cloned().collect())
    }

    fn get_all_weaknesses_with_full_detail(&self) -> Result<Vec<Value>> {
        Ok(self.weaknesses.values().cloned().collect())
    }

    fn get_all_mitigations_with_full_detail(&self) -> Result<Vec<Value>> {
        Ok(self.mitigations.values().cloned().collect())
    }
}
