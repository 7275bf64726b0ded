//! Module execution order
//!
//! Turns the manifest's `depends` relation into a single linear order.
//!
//! # Design
//!
//! - **Kahn's algorithm**: adjacency `dependency → [dependents]` plus an
//!   in-degree count per module
//! - **Pure logic**: no I/O, reads the manifest snapshot only
//! - **Seeded in manifest order**: the ready queue starts in registry order,
//!   then module name, and is drained FIFO
//!
//! # Ordering Guarantees
//!
//! | Property | Guaranteed |
//! |----------|------------|
//! | A dependency runs before every dependent | Yes |
//! | Every module appears exactly once | Yes |
//! | Order among modules of equal rank | No |
//!
//! The last row is deliberate. The current seeding happens to be stable, but
//! callers must only rely on the dependency partial order.

use crate::error::DependencyError;
use crate::manifest::Manifest;
use std::collections::{HashMap, VecDeque};

// ============================================================================
// Resolution
// ============================================================================

/// Compute the execution order for every module in `manifest`.
///
/// # Errors
///
/// - [`DependencyError::Missing`] when a `depends` entry names no module.
///   The validator normally catches this first.
/// - [`DependencyError::UnresolvableCycle`] when some modules can never reach
///   in-degree zero. The error lists them in manifest order.
pub fn resolve_order(manifest: &Manifest) -> Result<Vec<String>, DependencyError> {
    let names: Vec<&str> = manifest.modules().map(|m| m.full_name.as_str()).collect();

    let mut in_degree: HashMap<&str, usize> = names.iter().map(|n| (*n, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for module in manifest.modules() {
        for dep in &module.depends {
            if !in_degree.contains_key(dep.as_str()) {
                return Err(DependencyError::Missing {
                    module: module.full_name.clone(),
                    dependency: dep.clone(),
                });
            }
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(module.full_name.as_str());
            if let Some(count) = in_degree.get_mut(module.full_name.as_str()) {
                *count += 1;
            }
        }
    }

    let mut ready: VecDeque<&str> = names
        .iter()
        .copied()
        .filter(|n| in_degree.get(n) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(names.len());

    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        for dependent in dependents.get(name).map(Vec::as_slice).unwrap_or_default() {
            if let Some(count) = in_degree.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(*dependent);
                }
            }
        }
    }

    if order.len() < names.len() {
        let remaining = names
            .iter()
            .filter(|n| in_degree.get(*n).is_some_and(|c| *c > 0))
            .map(|n| n.to_string())
            .collect();
        return Err(DependencyError::UnresolvableCycle { remaining });
    }

    Ok(order)
}

/// Position of each module in `order`, for "runs before" checks.
pub fn positions(order: &[String]) -> HashMap<&str, usize> {
    order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
