//! Manifest discovery and parsing

use super::{CATEGORIES, Category, Manifest, Module};
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Return the first candidate that exists on disk.
pub fn find_manifest(candidates: &[PathBuf]) -> Result<PathBuf, ConfigError> {
    for path in candidates {
        if path.is_file() {
            debug!("Manifest found at {}", path.display());
            return Ok(path.clone());
        }
        debug!("No manifest at {}", path.display());
    }
    Err(ConfigError::NotFound {
        searched: candidates.to_vec(),
    })
}

/// Read and parse the manifest at `path`.
pub fn load_manifest(path: &Path) -> Result<Manifest, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest = parse_manifest(&text, path)?;
    info!(
        "Loaded {} modules from {}",
        manifest.module_count(),
        path.display()
    );
    Ok(manifest)
}

/// Parse manifest text. `origin` is only used in error messages.
///
/// Top-level keys must be registry categories. A category with no body
/// (`media:`) is treated as empty.
pub fn parse_manifest(text: &str, origin: &Path) -> Result<Manifest, ConfigError> {
    if text.trim().is_empty() {
        return Ok(empty_manifest());
    }

    let raw: Option<BTreeMap<String, Option<BTreeMap<String, Module>>>> =
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
    let mut raw = raw.unwrap_or_default();

    if let Some(unknown) = raw.keys().find(|k| !CATEGORIES.contains(&k.as_str())) {
        return Err(ConfigError::Structural(format!(
            "unknown category '{}', must be one of: {}",
            unknown,
            CATEGORIES.join(", ")
        )));
    }

    let mut categories = Vec::with_capacity(CATEGORIES.len());
    for &name in CATEGORIES {
        let mut modules = raw.remove(name).flatten().unwrap_or_default();
        for (short, module) in modules.iter_mut() {
            if short.is_empty() || short.contains('.') {
                return Err(ConfigError::Structural(format!(
                    "module name '{}' in category {} must be non-empty and must not contain '.'",
                    short, name
                )));
            }
            module.full_name = format!("{}.{}", name, short);
        }
        categories.push(Category { name, modules });
    }

    Ok(Manifest::from_categories(categories))
}

fn empty_manifest() -> Manifest {
    Manifest::from_categories(
        CATEGORIES
            .iter()
            .map(|&name| Category {
                name,
                modules: BTreeMap::new(),
            })
            .collect(),
    )
}
