//! Structural and dependency validation
//!
//! Pure checks over the in-memory manifest snapshot. Modules are visited in
//! manifest order so the first reported error is stable between runs.

use super::{Manifest, ModuleKind};
use crate::error::{ConfigError, DependencyError};
use std::collections::HashMap;

/// Check required fields and the `type` enumeration for every module.
pub fn validate_structure(manifest: &Manifest) -> Result<(), ConfigError> {
    for module in manifest.modules() {
        let name = &module.full_name;

        if module.start.trim().is_empty() {
            return Err(ConfigError::Structural(format!(
                "module {} missing required 'start' field",
                name
            )));
        }
        if module.end.trim().is_empty() {
            return Err(ConfigError::Structural(format!(
                "module {} missing required 'end' field",
                name
            )));
        }
        if module.kind.trim().is_empty() {
            return Err(ConfigError::Structural(format!(
                "module {} missing required 'type' field",
                name
            )));
        }
        if module.kind().is_none() {
            return Err(ConfigError::Structural(format!(
                "module {} has invalid type '{}', must be one of: {}",
                name,
                module.kind,
                ModuleKind::valid_values()
            )));
        }
        for (i, rule) in module.configs.iter().enumerate() {
            if rule.pattern.trim().is_empty() {
                return Err(ConfigError::Structural(format!(
                    "module {} config rule {} has an empty pattern",
                    name,
                    i + 1
                )));
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Check that every dependency exists and that the graph is acyclic.
///
/// All references are checked before any cycle search, so a manifest with
/// both problems reports the missing module.
pub fn validate_dependencies(manifest: &Manifest) -> Result<(), DependencyError> {
    for module in manifest.modules() {
        for dep in &module.depends {
            if !manifest.contains(dep) {
                return Err(DependencyError::Missing {
                    module: module.full_name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut marks: HashMap<&str, Mark> = manifest
        .modules()
        .map(|m| (m.full_name.as_str(), Mark::White))
        .collect();

    for module in manifest.modules() {
        if marks.get(module.full_name.as_str()) == Some(&Mark::White)
            && visit(manifest, &module.full_name, &mut marks)
        {
            return Err(DependencyError::Circular {
                module: module.full_name.clone(),
            });
        }
    }
    Ok(())
}

/// Depth-first walk; true when a gray node is reached again.
fn visit<'a>(manifest: &'a Manifest, name: &'a str, marks: &mut HashMap<&'a str, Mark>) -> bool {
    match marks.get(name) {
        Some(Mark::Gray) => return true,
        Some(Mark::Black) => return false,
        _ => {}
    }
    marks.insert(name, Mark::Gray);

    if let Some(module) = manifest.get(name) {
        for dep in &module.depends {
            if visit(manifest, dep, marks) {
                return true;
            }
        }
    }

    marks.insert(name, Mark::Black);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifest;
    use std::path::Path;

    fn manifest(yaml: &str) -> Manifest {
        parse_manifest(yaml, Path::new("test.yaml")).expect("parse")
    }

    fn module(name: &str, deps: &[&str]) -> String {
        format!(
            "  {}:\n    depends: [{}]\n    start: s\n    end: e\n    type: Package\n",
            name,
            deps.join(", ")
        )
    }

    #[test]
    fn test_valid_manifest_passes() {
        let m = manifest(&format!(
            "core:\n{}{}",
            module("a", &[]),
            module("b", &["core.a"])
        ));
        assert!(validate_structure(&m).is_ok());
        assert!(validate_dependencies(&m).is_ok());
    }

    #[test]
    fn test_missing_start_field() {
        let m = manifest("core:\n  a:\n    end: e\n    type: Package\n");
        let err = validate_structure(&m).unwrap_err();
        assert_eq!(err.to_string(), "module core.a missing required 'start' field");
    }

    #[test]
    fn test_missing_end_and_type_fields() {
        let m = manifest("core:\n  a:\n    start: s\n    type: Package\n");
        assert!(validate_structure(&m).unwrap_err().to_string().contains("'end'"));

        let m = manifest("core:\n  a:\n    start: s\n    end: e\n");
        assert!(validate_structure(&m).unwrap_err().to_string().contains("'type'"));
    }

    #[test]
    fn test_invalid_type_lists_valid_values() {
        let m = manifest("core:\n  a:\n    start: s\n    end: e\n    type: Script\n");
        let msg = validate_structure(&m).unwrap_err().to_string();
        assert!(msg.contains("invalid type 'Script'"));
        assert!(msg.contains("Package, Git, System, File, Module"));
    }

    #[test]
    fn test_missing_dependency() {
        let m = manifest(&format!("core:\n{}", module("a", &["core.ghost"])));
        let err = validate_dependencies(&m).unwrap_err();
        assert_eq!(
            err,
            DependencyError::Missing {
                module: "core.a".into(),
                dependency: "core.ghost".into()
            }
        );
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let m = manifest(&format!("core:\n{}", module("a", &["core.a"])));
        let err = validate_dependencies(&m).unwrap_err();
        assert!(matches!(err, DependencyError::Circular { .. }));
    }

    #[test]
    fn test_two_node_cycle() {
        let m = manifest(&format!(
            "core:\n{}{}",
            module("a", &["core.b"]),
            module("b", &["core.a"])
        ));
        let err = validate_dependencies(&m).unwrap_err();
        assert!(err.to_string().contains("circular dependency"));
    }

    #[test]
    fn test_cross_category_diamond_is_acyclic() {
        let m = manifest(&format!(
            "core:\n{}system:\n{}{}desktop:\n{}",
            module("base", &[]),
            module("audio", &["core.base"]),
            module("net", &["core.base"]),
            module("hypr", &["system.audio", "system.net"])
        ));
        assert!(validate_dependencies(&m).is_ok());
    }

    #[test]
    fn test_missing_reported_before_cycle() {
        let m = manifest(&format!(
            "core:\n{}{}",
            module("a", &["core.a"]),
            module("b", &["core.nope"])
        ));
        assert!(matches!(
            validate_dependencies(&m).unwrap_err(),
            DependencyError::Missing { .. }
        ));
    }
}
