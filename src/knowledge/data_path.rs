//! Locating the SOLVE-IT data directory
//!
//! Resolution order: explicit path (`--data-path`), then `SOLVE_IT_DATA_PATH`,
//! then `solve-it-main/data` next to or below the working directory. An
//! explicit or environment path may point at either the repository root or
//! its `data/` directory.

use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DATA_PATH_ENV: &str = "SOLVE_IT_DATA_PATH";

/// Directory name of a checked-out SOLVE-IT repository
pub const SOLVE_IT_DIR: &str = "solve-it-main";

pub const REQUIRED_DIRS: [&str; 3] = ["techniques", "weaknesses", "mitigations"];

/// Mapping files shipped with SOLVE-IT
pub const KNOWN_MAPPING_FILES: [&str; 3] = ["solve-it.json", "carrier.json", "dfrws.json"];

/// Resolve using the process environment and working directory
pub fn resolve(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let env_value = std::env::var(DATA_PATH_ENV).ok().filter(|v| !v.trim().is_empty());
    let cwd = std::env::current_dir()
        .map_err(|e| ConfigError::DataPath(format!("cannot read working directory: {}", e)))?;
    resolve_from(explicit, env_value.as_deref(), &cwd)
}

/// Resolution without touching process state
pub fn resolve_from(
    explicit: Option<&Path>,
    env_value: Option<&str>,
    search_root: &Path,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        debug!(path = %path.display(), "Using data path from command line");
        return data_dir_within(path, "Custom path");
    }

    if let Some(value) = env_value {
        debug!(path = value, "Using data path from {}", DATA_PATH_ENV);
        return data_dir_within(Path::new(value), "Environment path");
    }

    let adjacent = search_root.join("..").join(SOLVE_IT_DIR).join("data");
    let nested = search_root.join(SOLVE_IT_DIR).join("data");

    for candidate in [&adjacent, &nested] {
        if candidate.is_dir() {
            info!(path = %candidate.display(), "Found SOLVE-IT data");
            return Ok(candidate.clone());
        }
    }

    Err(ConfigError::DataPath(format!(
        "SOLVE-IT data directory not found. Place {dir} next to the server, set {env}, \
         or pass --data-path. Searched: {adjacent}, {nested}",
        dir = SOLVE_IT_DIR,
        env = DATA_PATH_ENV,
        adjacent = adjacent.display(),
        nested = nested.display(),
    )))
}

fn data_dir_within(path: &Path, origin: &str) -> Result<PathBuf, ConfigError> {
    if !path.is_dir() {
        return Err(ConfigError::DataPath(format!(
            "{} {} does not exist",
            origin,
            path.display()
        )));
    }

    if path.join("data").is_dir() {
        Ok(path.join("data"))
    } else if path.join("techniques").is_dir() {
        Ok(path.to_path_buf())
    } else {
        Err(ConfigError::DataPath(format!(
            "{} {} does not contain SOLVE-IT data",
            origin,
            path.display()
        )))
    }
}

/// Check that `path` has the three item directories.
///
/// A missing mapping file is only a warning; objective tools then return
/// empty lists.
pub fn validate(path: &Path) -> Result<(), ConfigError> {
    if !path.is_dir() {
        return Err(ConfigError::DataPath(format!(
            "{} is not a directory",
            path.display()
        )));
    }

    if let Some(missing) = REQUIRED_DIRS.iter().find(|d| !path.join(d).is_dir()) {
        return Err(ConfigError::DataPath(format!(
            "{} is missing the '{}' directory",
            path.display(),
            missing
        )));
    }

    let has_mapping = mapping_dirs(path)
        .iter()
        .any(|dir| KNOWN_MAPPING_FILES.iter().any(|f| dir.join(f).is_file()));
    if !has_mapping {
        warn!(path = %path.display(), "No objective mapping files found");
    }

    Ok(())
}

/// Directories searched for mapping files: the data directory, then its parent
pub fn mapping_dirs(data_path: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![data_path.to_path_buf()];
    if let Some(parent) = data_path.parent() {
        if !parent.as_os_str().is_empty() {
            dirs.push(parent.to_path_buf());
        }
    }
    dirs
}
