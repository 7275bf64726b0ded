//! Tests for module execution
//!
//! Drives `ExecutionEngine` against fake package managers and a recording
//! command runner.
//!
//! These tests verify:
//! - Package installs are idempotent
//! - Fallback installs are re-verified
//! - A failing command skips the rest of its module only
//! - Critical modules escalate their failures
//! - Config rules honor preservation policy

mod common;

use common::{Harness, default_answers};
use riotinstall::InstallerError;
use riotinstall::engine::{ExecutionEngine, ModuleStatus};
use riotinstall::manifest::{Manifest, parse_manifest};
use riotinstall::preservation::PreservationConfig;
use std::fs;
use std::path::Path;

fn manifest(text: &str) -> Manifest {
    parse_manifest(text, Path::new("packages.yaml")).expect("manifest parses")
}

// =============================================================================
// Package Installation Tests
// =============================================================================

#[test]
fn test_installed_packages_cause_no_install_calls() {
    let (h, responder) = Harness::builder()
        .installed(&["git", "fish"])
        .build(default_answers);
    let m = manifest(
        r#"
core:
  shell:
    packages: [git, fish]
    start: "Shell"
    end: "Shell ready"
    type: Package
"#,
    );

    let collab = h.collaborators();
    let rules = PreservationConfig::default();
    let report = ExecutionEngine::new(&h.ctx, &collab, &rules)
        .run(&m, |_, _, _| {})
        .expect("engine run");

    assert_eq!(report.modules[0].status, ModuleStatus::Completed);
    assert!(h.primary.install_calls().is_empty());
    assert!(h.fallback.install_calls().is_empty());
    h.finish(responder);
}

#[test]
fn test_missing_packages_install_as_one_batch() {
    let (h, responder) = Harness::builder().installed(&["git"]).build(default_answers);
    let m = manifest(
        r#"
core:
  shell:
    packages: [git, fish, starship]
    start: "Shell"
    end: "Shell ready"
    type: Package
"#,
    );

    let collab = h.collaborators();
    let rules = PreservationConfig::default();
    ExecutionEngine::new(&h.ctx, &collab, &rules)
        .run(&m, |_, _, _| {})
        .expect("engine run");

    assert_eq!(
        h.primary.install_calls(),
        vec![vec!["fish".to_string(), "starship".to_string()]]
    );
    assert!(h.installed().contains("starship"));
    h.finish(responder);
}

#[test]
fn test_fallback_success_is_verified() {
    let (h, responder) = Harness::builder()
        .primary_fails()
        .fallback_skips(&["ghost-bin"])
        .build(default_answers);
    let m = manifest(
        r#"
desktop:
  apps:
    packages: [zen-browser-bin, ghost-bin]
    start: "Apps"
    end: "Apps ready"
    type: Package
"#,
    );

    let collab = h.collaborators();
    let rules = PreservationConfig::default();
    let report = ExecutionEngine::new(&h.ctx, &collab, &rules)
        .run(&m, |_, _, _| {})
        .expect("non-critical failure does not stop the engine");

    let outcome = &report.modules[0];
    assert_eq!(outcome.status, ModuleStatus::CompletedWithWarnings);
    assert!(
        outcome.warnings[0].contains("not installed: ghost-bin"),
        "unexpected warning: {}",
        outcome.warnings[0]
    );
    // Initial attempt plus the retry after a refresh
    assert_eq!(h.primary.install_calls().len(), 2);
    assert_eq!(h.fallback.install_calls().len(), 1);
    assert!(h.installed().contains("zen-browser-bin"));
    h.finish(responder);
}

// =============================================================================
// Command Execution Tests
// =============================================================================

#[test]
fn test_failed_command_skips_rest_of_module_only() {
    let (h, responder) = Harness::builder().build(default_answers);
    h.runner.fail_on("systemctl enable --now broken");
    let m = manifest(
        r#"
system:
  services:
    commands:
      - "echo first"
      - "systemctl enable --now broken"
      - "echo third"
    start: "Services"
    end: "Services ready"
    type: System
  after:
    depends: [system.services]
    commands: ["echo after"]
    start: "After"
    end: "After done"
    type: System
"#,
    );

    let collab = h.collaborators();
    let rules = PreservationConfig::default();
    let report = ExecutionEngine::new(&h.ctx, &collab, &rules)
        .run(&m, |_, _, _| {})
        .expect("engine run");

    assert_eq!(
        h.runner.shell_commands(),
        vec!["echo first", "systemctl enable --now broken", "echo after"]
    );
    let services = &report.modules[0];
    assert_eq!(services.status, ModuleStatus::CompletedWithWarnings);
    assert!(services.warnings[0].contains("command 2/3 failed, 1 remaining skipped"));
    assert_eq!(report.modules[1].status, ModuleStatus::Completed);
    h.finish(responder);
}

#[test]
fn test_critical_module_failure_is_fatal() {
    let (h, responder) = Harness::builder().build(default_answers);
    h.runner.fail_on("mkinitcpio");
    let m = manifest(
        r#"
core:
  base:
    commands: ["sudo mkinitcpio -P"]
    critical: true
    start: "Base"
    end: "Base done"
    type: System
  later:
    depends: [core.base]
    commands: ["echo later"]
    start: "Later"
    end: "Later done"
    type: System
"#,
    );

    let collab = h.collaborators();
    let rules = PreservationConfig::default();
    let mut completed = Vec::new();
    let err = ExecutionEngine::new(&h.ctx, &collab, &rules)
        .run(&m, |_, _, name| completed.push(name.to_string()))
        .expect_err("critical failure escalates");

    match err {
        InstallerError::ControllerFatal { message, .. } => {
            assert!(message.contains("critical module core.base failed"));
        }
        other => panic!("expected ControllerFatal, got {:?}", other),
    }
    assert!(completed.is_empty());
    assert!(!h.runner.shell_commands().contains(&"echo later".to_string()));
    h.finish(responder);
}

#[test]
fn test_callback_reports_each_module_in_order() {
    let (h, responder) = Harness::builder().build(default_answers);
    let m = manifest(
        r#"
core:
  c:
    depends: [core.b]
    start: "C"
    end: "C"
    type: Module
  b:
    depends: [core.a]
    start: "B"
    end: "B"
    type: Module
  a:
    start: "A"
    end: "A"
    type: Module
"#,
    );

    let collab = h.collaborators();
    let rules = PreservationConfig::default();
    let mut seen = Vec::new();
    let report = ExecutionEngine::new(&h.ctx, &collab, &rules)
        .run(&m, |done, total, name| seen.push((done, total, name.to_string())))
        .expect("engine run");

    assert_eq!(report.order, vec!["core.a", "core.b", "core.c"]);
    assert_eq!(
        seen,
        vec![
            (1, 3, "core.a".to_string()),
            (2, 3, "core.b".to_string()),
            (3, 3, "core.c".to_string()),
        ]
    );
    h.finish(responder);
}

// =============================================================================
// Config Deployment Tests
// =============================================================================

#[test]
fn test_config_rules_preserve_backup_and_skip_identical() {
    let (h, responder) = Harness::builder().build(default_answers);
    h.write_source("fish/config.fish", "set -g theme riot\n");
    h.write_source("fish/fish_variables", "SETUVAR fresh\n");
    h.write_source("fish/functions/ll.fish", "function ll; ls -l; end\n");

    h.write_config("fish/config.fish", "set -g theme mine\n");
    h.write_config("fish/fish_variables", "SETUVAR user\n");
    h.write_config("fish/functions/ll.fish", "function ll; ls -l; end\n");

    let rules = PreservationConfig::parse(
        r#"
managed_files:
  - path: "~/.config/fish/config.fish"
    backup: side_by_side
    when: on_overwrite_diff
  - path: "~/.config/fish/functions/ll.fish"
    backup: side_by_side
"#,
        Path::new("preserve.yaml"),
    )
    .expect("rules parse");

    let m = manifest(
        r#"
development:
  shell:
    configs:
      - pattern: "fish/*"
        preserve_if_exists: [fish_variables]
    start: "Shell config"
    end: "Shell configured"
    type: File
"#,
    );

    let collab = h.collaborators();
    ExecutionEngine::new(&h.ctx, &collab, &rules)
        .run(&m, |_, _, _| {})
        .expect("engine run");

    let fish = h.ctx.paths.config_home.join("fish");
    assert_eq!(fs::read_to_string(fish.join("config.fish")).unwrap(), "set -g theme riot\n");
    assert_eq!(fs::read_to_string(fish.join("config.fish.old")).unwrap(), "set -g theme mine\n");
    assert_eq!(fs::read_to_string(fish.join("fish_variables")).unwrap(), "SETUVAR user\n");
    assert!(!fish.join("functions/ll.fish.old").exists());
    h.finish(responder);
}

#[test]
fn test_missing_config_source_is_a_warning() {
    let (h, responder) = Harness::builder().build(default_answers);
    let m = manifest(
        r#"
theming:
  gtk:
    configs:
      - pattern: "gtk-3.0/*"
    commands: ["echo themed"]
    start: "GTK"
    end: "GTK done"
    type: File
"#,
    );

    let collab = h.collaborators();
    let rules = PreservationConfig::default();
    let report = ExecutionEngine::new(&h.ctx, &collab, &rules)
        .run(&m, |_, _, _| {})
        .expect("engine run");

    let outcome = &report.modules[0];
    assert_eq!(outcome.status, ModuleStatus::CompletedWithWarnings);
    assert!(outcome.warnings[0].contains("source for 'gtk-3.0/*' not found"));
    // Commands still run after a deploy failure
    assert_eq!(h.runner.shell_commands(), vec!["echo themed"]);
    h.finish(responder);
}
