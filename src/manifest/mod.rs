//! Module manifest model
//!
//! The manifest maps a category name to a set of named modules. Categories
//! come from a static, ordered registry rather than from whatever keys the
//! document happens to contain, so iteration order over the manifest is
//! fixed: registry order first, then module name.
//!
//! # Lifecycle
//!
//! A `Manifest` is produced once per run by the loader and is never mutated
//! afterwards. Every other component borrows it.

pub mod loader;
pub mod validator;

use serde::Deserialize;
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

pub use loader::{find_manifest, load_manifest, parse_manifest};
pub use validator::{validate_dependencies, validate_structure};

/// Known categories, in listing order.
pub const CATEGORIES: &[&str] = &[
    "core",
    "system",
    "development",
    "desktop",
    "media",
    "utilities",
    "productivity",
    "specialty",
    "theming",
];

/// What a module mostly does. Used for log glyphs and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum ModuleKind {
    Package,
    Git,
    System,
    File,
    Module,
}

impl ModuleKind {
    /// Comma separated list of valid `type` values
    pub fn valid_values() -> String {
        Self::iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A single config copy rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConfigRule {
    /// Literal file path or `dir/*`, relative to the config source root
    pub pattern: String,
    /// Optional destination, `~/` expands to the home directory
    #[serde(default)]
    pub target: Option<String>,
    /// File names kept if they already exist at the destination
    #[serde(default)]
    pub preserve_if_exists: Vec<String>,
}

impl ConfigRule {
    /// Directory name for a `dir/*` pattern
    pub fn directory(&self) -> Option<&str> {
        self.pattern.strip_suffix("/*")
    }
}

/// One unit of installation work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Module {
    /// `category.name`, filled in by the loader
    #[serde(skip)]
    pub full_name: String,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub configs: Vec<ConfigRule>,
    #[serde(default)]
    pub commands: Vec<String>,
    /// Full names of modules that must run first
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    /// Raw `type` value; checked by the structural validator
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Escalate failures inside this module to a fatal run failure
    #[serde(default)]
    pub critical: bool,
}

impl Module {
    /// Parsed module kind, `None` when the raw value is not recognised
    pub fn kind(&self) -> Option<ModuleKind> {
        self.kind.parse().ok()
    }
}

/// Modules of one category, keyed by short name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Category {
    pub name: &'static str,
    pub modules: BTreeMap<String, Module>,
}

/// Immutable snapshot of the manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    categories: Vec<Category>,
}

impl Manifest {
    /// Build from registry-ordered categories
    pub(crate) fn from_categories(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    /// Categories in registry order, including empty ones
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// All modules in registry order, then name order
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.categories.iter().flat_map(|c| c.modules.values())
    }

    /// Look a module up by full name
    pub fn get(&self, full_name: &str) -> Option<&Module> {
        let (category, name) = full_name.split_once('.')?;
        self.categories
            .iter()
            .find(|c| c.name == category)
            .and_then(|c| c.modules.get(name))
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.get(full_name).is_some()
    }

    /// Total number of modules across all categories
    pub fn module_count(&self) -> usize {
        self.categories.iter().map(|c| c.modules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.module_count() == 0
    }
}
