//! Validate-only report
//!
//! Runs the loader, validator, command safety checks and resolver against a
//! manifest without executing anything, stopping at the first failing step.

use crate::command_safety;
use crate::logger::{GlyphStyle, Status};
use crate::logic::resolver;
use crate::manifest::{self, Manifest};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One line of the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckStep {
    pub label: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub steps: Vec<CheckStep>,
    /// Every unsafe command found, not only the first
    pub findings: Vec<String>,
    pub order: Option<Vec<String>>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.passed)
    }

    fn pass(&mut self, label: &'static str, detail: impl Into<String>) {
        self.steps.push(CheckStep {
            label,
            passed: true,
            detail: detail.into(),
        });
    }

    /// Record a failure; always returns the report for early exit.
    fn fail(mut self, label: &'static str, detail: impl Into<String>) -> Self {
        self.steps.push(CheckStep {
            label,
            passed: false,
            detail: detail.into(),
        });
        self
    }

    /// Printable report, one line per step plus extra findings.
    pub fn render(&self, glyphs: GlyphStyle) -> String {
        let mut out = String::new();
        for step in &self.steps {
            let status = if step.passed { Status::Success } else { Status::Error };
            let _ = writeln!(out, "{} {}: {}", glyphs.status(status), step.label, step.detail);
        }
        for finding in self.findings.iter().skip(1) {
            let _ = writeln!(out, "    also: {}", finding);
        }
        out
    }
}

/// Check the manifest at `explicit`, or the first of `candidates` that exists.
pub fn check_manifest(explicit: Option<&Path>, candidates: &[PathBuf]) -> ValidationReport {
    let mut report = ValidationReport::default();

    let found = match explicit {
        Some(path) => manifest::find_manifest(&[path.to_path_buf()]),
        None => manifest::find_manifest(candidates),
    };
    let path = match found {
        Ok(path) => path,
        Err(e) => return report.fail("Manifest found", e.to_string()),
    };
    report.pass("Manifest found", path.display().to_string());

    let loaded = match manifest::load_manifest(&path) {
        Ok(m) => m,
        Err(e) => return report.fail("YAML structure valid", e.to_string()),
    };
    report.pass("YAML structure valid", describe(&loaded));

    check_loaded(report, &loaded)
}

/// The checks that follow a successful load.
pub fn check_loaded(mut report: ValidationReport, loaded: &Manifest) -> ValidationReport {
    if let Err(e) = manifest::validate_structure(loaded) {
        return report.fail("Required fields present", e.to_string());
    }
    report.pass("Required fields present", "every module has start, end and type");

    if let Err(e) = manifest::validate_dependencies(loaded) {
        return report.fail("Dependencies valid", e.to_string());
    }
    report.pass("Dependencies valid", "all references exist, no cycles");

    let findings = command_safety::scan_manifest(loaded);
    if let Some(first) = findings.first() {
        report.findings = findings.iter().map(|f| f.to_string()).collect();
        let detail = if findings.len() > 1 {
            format!("{} ({} finding(s))", first, findings.len())
        } else {
            first.to_string()
        };
        return report.fail("Commands safe", detail);
    }
    report.pass("Commands safe", "no dangerous patterns");

    match resolver::resolve_order(loaded) {
        Ok(order) => {
            debug!("Resolved order: {:?}", order);
            report.pass("Resolved order", order.join(" → "));
            report.order = Some(order);
            report
        }
        Err(e) => report.fail("Resolved order", e.to_string()),
    }
}

fn describe(m: &Manifest) -> String {
    let used = m.categories().iter().filter(|c| !c.modules.is_empty()).count();
    format!("{} module(s) in {} categor{}", m.module_count(), used, if used == 1 { "y" } else { "ies" })
}
