//! Tests for the orchestration controller
//!
//! Full runs against fake collaborators, with a responder thread answering
//! prompts the way a user would.
//!
//! These tests verify:
//! - Stage order, module order and progress
//! - Cancel, failure and retry flows
//! - Git identity reuse and credential timeouts
//! - Upgrade, reboot and Secure Boot prompts

mod common;

use common::{FakeSystem, Harness, default_answers};
use riotinstall::coordinator::{Answer, Prompt};
use riotinstall::install_state::InstallStage;
use riotinstall::manifest::parse_manifest;
use riotinstall::orchestrator::{self, Controller, RunOutcome};
use riotinstall::system::SecureBootStatus;
use riotinstall::InstallerError;
use std::fs;
use std::path::Path;

const CHAIN: &str = r#"
core:
  c:
    depends: [core.b]
    commands: ["echo c"]
    start: "C"
    end: "C done"
    type: System
  a:
    commands: ["echo a"]
    start: "A"
    end: "A done"
    type: System
  b:
    depends: [core.a]
    commands: ["echo b"]
    start: "B"
    end: "B done"
    type: System
"#;

const IDENTITY: &str = r#"
core:
  identity:
    packages: [git]
    start: "Git identity"
    end: "Git configured"
    type: Git
"#;

// =============================================================================
// Happy Path Tests
// =============================================================================

#[test]
fn test_full_run_in_dependency_order() {
    let (h, responder) = Harness::builder().build(default_answers);
    h.write_manifest(CHAIN);

    let (outcome, order, stage) = {
        let mut controller = Controller::new(&h.ctx, h.collaborators());
        let outcome = controller.run();
        let order = controller.last_report().map(|r| r.order.clone());
        (outcome, order, controller.tracker().current_stage())
    };

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            kernel_upgraded: false,
            reboot_requested: false
        }
    );
    assert_eq!(
        order,
        Some(vec!["core.a".to_string(), "core.b".to_string(), "core.c".to_string()])
    );
    assert_eq!(stage, InstallStage::Complete);
    assert_eq!(h.runner.shell_commands(), vec!["echo a", "echo b", "echo c"]);
    assert_eq!(h.system.calls(), vec!["sync", "boot_screen", "secure_boot_status"]);

    let (transcript, _home) = h.finish(responder);
    assert_eq!(transcript.prompts[0], Prompt::InstallConfirm);
    assert!(transcript.asked(|p| *p == Prompt::UpgradeConfirm));
    assert_eq!(
        transcript.prompts.last(),
        Some(&Prompt::Reboot { default_yes: false })
    );
}

#[test]
fn test_progress_is_rounded_and_monotonic() {
    let (h, responder) = Harness::builder().build(default_answers);
    h.write_manifest(CHAIN);

    {
        let mut controller = Controller::new(&h.ctx, h.collaborators());
        controller.run();
    }

    let (transcript, _home) = h.finish(responder);
    let progress = transcript.progress();
    assert!(progress.windows(2).all(|w| w[0] < w[1]), "{:?}", progress);
    for value in &progress {
        let steps = value * 20.0;
        assert!((steps - steps.round()).abs() < 1e-9, "{} is not a 5% step", value);
    }
    // One step per finished module: 0.30 + 0.60 * k / 3
    assert!(progress.iter().any(|v| (v - 0.50).abs() < 1e-9));
    assert!(progress.iter().any(|v| (v - 0.70).abs() < 1e-9));
    assert_eq!(progress.last().copied(), Some(1.0));
}

#[test]
fn test_manifest_override_skips_search() {
    let (h, responder) = Harness::builder().build(default_answers);
    let elsewhere = h.home.path().join("custom.yaml");
    fs::write(&elsewhere, CHAIN).unwrap();

    let outcome = {
        let mut controller = Controller::new(&h.ctx, h.collaborators()).with_manifest(&elsewhere);
        controller.run()
    };

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(h.runner.shell_commands().len(), 3);
    h.finish(responder);
}

// =============================================================================
// Cancel / Failure / Retry Tests
// =============================================================================

#[test]
fn test_declined_confirmation_cancels_without_side_effects() {
    let (h, responder) = Harness::builder().build(|prompt| match prompt {
        Prompt::InstallConfirm => Answer::No,
        other => default_answers(other),
    });
    h.write_manifest(CHAIN);

    let outcome = Controller::new(&h.ctx, h.collaborators()).run();

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(h.system.calls().is_empty());
    assert!(h.runner.calls().is_empty());
    let (transcript, _home) = h.finish(responder);
    assert!(transcript.failures().is_empty());
}

#[test]
fn test_cycle_fails_validation_before_any_module() {
    let (h, responder) = Harness::builder().build(|prompt| match prompt {
        Prompt::FailureExit { .. } => Answer::No,
        other => default_answers(other),
    });
    h.write_manifest(
        r#"
core:
  a:
    depends: [core.b]
    commands: ["echo a"]
    start: "A"
    end: "A"
    type: System
  b:
    depends: [core.a]
    commands: ["echo b"]
    start: "B"
    end: "B"
    type: System
"#,
    );

    let (outcome, failed_at) = {
        let mut controller = Controller::new(&h.ctx, h.collaborators());
        let outcome = controller.run();
        (outcome, controller.tracker().failed_at())
    };

    let RunOutcome::Failed { message } = outcome else {
        panic!("expected Failed, got {:?}", outcome);
    };
    assert!(message.contains("circular dependency"), "{}", message);
    assert!(message.starts_with("Validating configuration failed"));
    assert_eq!(failed_at, Some(InstallStage::ValidateConfig));
    assert!(h.runner.shell_commands().is_empty());

    let (transcript, _home) = h.finish(responder);
    assert_eq!(transcript.failures(), vec![message]);
    assert!(!transcript.asked(|p| *p == Prompt::UpgradeConfirm));
}

#[test]
fn test_exit_answer_ends_run() {
    let (h, responder) = Harness::builder()
        .system(FakeSystem::default().failing_syncs(1))
        .build(default_answers);
    h.write_manifest(CHAIN);

    let outcome = Controller::new(&h.ctx, h.collaborators()).run();

    let RunOutcome::Exited { message } = outcome else {
        panic!("expected Exited, got {:?}", outcome);
    };
    assert!(message.starts_with("Syncing package databases failed"));
    h.finish(responder);
}

#[test]
fn test_retry_restarts_from_prepare() {
    let (h, responder) = Harness::builder()
        .system(FakeSystem::default().failing_syncs(1))
        .build(|prompt| match prompt {
            Prompt::FailureExit { .. } => Answer::Retry,
            other => default_answers(other),
        });
    h.write_manifest(CHAIN);

    let (outcome, attempts) = {
        let mut controller = Controller::new(&h.ctx, h.collaborators());
        let outcome = controller.run();
        (outcome, controller.attempts())
    };

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(attempts, 2);
    assert_eq!(&h.system.calls()[..2], &["sync", "sync"]);
    assert_eq!(h.runner.shell_commands(), vec!["echo a", "echo b", "echo c"]);

    let (transcript, _home) = h.finish(responder);
    assert_eq!(transcript.failures().len(), 1);
    // The install confirmation is asked once, not per attempt
    let confirms = transcript
        .prompts
        .iter()
        .filter(|p| **p == Prompt::InstallConfirm)
        .count();
    assert_eq!(confirms, 1);
}

// =============================================================================
// Credential Tests
// =============================================================================

#[test]
fn test_existing_identity_is_reused() {
    let (h, responder) = Harness::builder().installed(&["git"]).build(default_answers);
    h.runner.respond("--get user.name", "Existing Riot\n");
    h.runner.respond("--get user.email", "riot@old.example\n");
    h.write_manifest(IDENTITY);

    let outcome = Controller::new(&h.ctx, h.collaborators()).run();
    assert!(matches!(outcome, RunOutcome::Completed { .. }));

    let calls = h.runner.calls();
    assert!(calls.contains(&"git config --global user.name Existing Riot".to_string()));
    assert!(calls.contains(&"git config --global user.email riot@old.example".to_string()));
    assert!(calls.contains(&"git config --global pull.rebase true".to_string()));

    let saved = fs::read_to_string(&h.ctx.paths.user_env).unwrap();
    assert!(saved.contains("GIT_USERNAME=Existing Riot"));
    assert!(saved.contains("GIT_EMAIL=riot@old.example"));

    let (transcript, _home) = h.finish(responder);
    assert!(transcript.asked(|p| matches!(
        p,
        Prompt::CredentialReuse { username, .. } if username == "Existing Riot"
    )));
    assert!(!transcript.asked(|p| *p == Prompt::Username));
}

#[test]
fn test_new_identity_is_prompted() {
    let (h, responder) = Harness::builder().installed(&["git"]).build(default_answers);
    h.write_manifest(IDENTITY);

    let outcome = Controller::new(&h.ctx, h.collaborators()).run();
    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert!(h.runner.calls().contains(&"git config --global user.name riot".to_string()));

    let (transcript, _home) = h.finish(responder);
    assert!(!transcript.asked(|p| matches!(p, Prompt::CredentialReuse { .. })));
    assert!(transcript.asked(|p| *p == Prompt::Username));
    assert!(transcript.asked(|p| *p == Prompt::Email));
}

#[test]
fn test_unanswered_credential_prompt_is_fatal() {
    let (h, responder) = Harness::builder()
        .installed(&["git"])
        .build_script(|prompt| match prompt {
            Prompt::Username => None,
            Prompt::FailureExit { .. } => Some(Answer::No),
            other => Some(default_answers(other)),
        });
    h.write_manifest(IDENTITY);

    let outcome = Controller::new(&h.ctx, h.collaborators()).run();

    let RunOutcome::Failed { message } = outcome else {
        panic!("expected Failed, got {:?}", outcome);
    };
    assert!(message.contains("Credential setup timed out"), "{}", message);
    assert!(!h.ctx.paths.user_env.exists());
    h.finish(responder);
}

// =============================================================================
// Upgrade / Reboot / Secure Boot Tests
// =============================================================================

#[test]
fn test_kernel_upgrade_defaults_reboot_to_yes() {
    let (h, responder) = Harness::builder()
        .system(FakeSystem::default().with_kernel_upgrade())
        .build(|prompt| match prompt {
            Prompt::UpgradeConfirm | Prompt::Reboot { .. } => Answer::Yes,
            other => default_answers(other),
        });
    h.write_manifest(CHAIN);

    let outcome = Controller::new(&h.ctx, h.collaborators()).run();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            kernel_upgraded: true,
            reboot_requested: true
        }
    );
    let calls = h.system.calls();
    assert!(calls.contains(&"upgrade"));
    assert_eq!(calls.last(), Some(&"reboot"));

    let (transcript, _home) = h.finish(responder);
    assert!(transcript.asked(|p| *p == Prompt::Reboot { default_yes: true }));
}

#[test]
fn test_secure_boot_setup_after_both_confirmations() {
    let status = SecureBootStatus {
        enabled: false,
        supported: true,
        luks: true,
    };
    let (h, responder) = Harness::builder()
        .system(FakeSystem::default().with_secure_boot(status))
        .build(default_answers);
    h.write_manifest(CHAIN);

    Controller::new(&h.ctx, h.collaborators()).run();
    assert!(h.system.calls().contains(&"secure_boot_setup"));

    let (transcript, _home) = h.finish(responder);
    assert!(transcript.asked(|p| *p == Prompt::SecureBootEnable));
    assert!(transcript.asked(|p| *p == Prompt::SecureBootContinue));
}

#[test]
fn test_secure_boot_not_offered_without_luks() {
    let status = SecureBootStatus {
        enabled: false,
        supported: true,
        luks: false,
    };
    let (h, responder) = Harness::builder()
        .system(FakeSystem::default().with_secure_boot(status))
        .build(default_answers);
    h.write_manifest(CHAIN);

    Controller::new(&h.ctx, h.collaborators()).run();
    assert!(!h.system.calls().contains(&"secure_boot_setup"));

    let (transcript, _home) = h.finish(responder);
    assert!(!transcript.asked(|p| *p == Prompt::SecureBootEnable));
}

#[test]
fn test_unanswered_secure_boot_prompt_is_logged_as_timeout() {
    let status = SecureBootStatus {
        enabled: false,
        supported: true,
        luks: true,
    };
    let (h, responder) = Harness::builder()
        .system(FakeSystem::default().with_secure_boot(status))
        .confirm_timeout(1)
        .hold_unanswered()
        .build_script(|prompt| match prompt {
            Prompt::SecureBootEnable => None,
            other => Some(default_answers(other)),
        });
    h.write_manifest(CHAIN);

    let outcome = Controller::new(&h.ctx, h.collaborators()).run();

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert!(!h.system.calls().contains(&"secure_boot_setup"));

    let (transcript, _home) = h.finish(responder);
    let log = transcript.log_text();
    assert!(
        log.iter().any(|l| l.contains("Setup skipped: timed out after 1s")),
        "{:?}",
        log
    );
    assert!(!log.iter().any(|l| l.contains("Setup declined")));
    assert!(!transcript.asked(|p| *p == Prompt::SecureBootContinue));
}

#[test]
fn test_declined_secure_boot_is_logged_as_declined() {
    let status = SecureBootStatus {
        enabled: false,
        supported: true,
        luks: true,
    };
    let (h, responder) = Harness::builder()
        .system(FakeSystem::default().with_secure_boot(status))
        .build(|prompt| match prompt {
            Prompt::SecureBootEnable => Answer::No,
            other => default_answers(other),
        });
    h.write_manifest(CHAIN);

    Controller::new(&h.ctx, h.collaborators()).run();

    let (transcript, _home) = h.finish(responder);
    let log = transcript.log_text();
    assert!(log.iter().any(|l| l.contains("Setup declined")));
    assert!(!log.iter().any(|l| l.contains("Setup skipped")));
}

#[test]
fn test_lost_reboot_prompt_is_logged() {
    let (h, responder) = Harness::builder().build_script(|prompt| match prompt {
        Prompt::Reboot { .. } => None,
        other => Some(default_answers(other)),
    });
    h.write_manifest(CHAIN);

    let outcome = Controller::new(&h.ctx, h.collaborators()).run();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            kernel_upgraded: false,
            reboot_requested: false
        }
    );
    assert!(!h.system.calls().contains(&"reboot"));
    let (transcript, _home) = h.finish(responder);
    assert!(
        transcript
            .log_text()
            .iter()
            .any(|l| l.contains("Reboot skipped: user interface disconnected"))
    );
}

#[test]
fn test_failed_upgrade_is_logged_and_run_continues() {
    let (h, responder) = Harness::builder()
        .system(FakeSystem::default().with_kernel_upgrade().fail_upgrade())
        .build(|prompt| match prompt {
            Prompt::UpgradeConfirm => Answer::Yes,
            other => default_answers(other),
        });
    h.write_manifest(CHAIN);

    let outcome = Controller::new(&h.ctx, h.collaborators()).run();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            kernel_upgraded: false,
            reboot_requested: false
        }
    );
    assert_eq!(
        h.system.calls(),
        vec!["sync", "upgrade", "boot_screen", "secure_boot_status"]
    );

    let (transcript, _home) = h.finish(responder);
    assert!(transcript.failures().is_empty());
    let log = transcript.log_text();
    assert!(
        log.iter().any(|l| l.contains("Failed: pacman -Su failed")),
        "{:?}",
        log
    );
    assert!(transcript.asked(|p| *p == Prompt::Reboot { default_yes: false }));
}

#[test]
fn test_boot_screen_failure_is_fatal() {
    let (h, responder) = Harness::builder()
        .system(FakeSystem::default().fail_boot_screen())
        .build(|prompt| match prompt {
            Prompt::FailureExit { .. } => Answer::No,
            other => default_answers(other),
        });
    h.write_manifest(CHAIN);

    let (outcome, failed_at) = {
        let mut controller = Controller::new(&h.ctx, h.collaborators());
        let outcome = controller.run();
        (outcome, controller.tracker().failed_at())
    };

    let RunOutcome::Failed { message } = outcome else {
        panic!("expected Failed, got {:?}", outcome);
    };
    assert!(message.starts_with("Installing boot screen failed"), "{}", message);
    assert!(message.contains("theme not found"));
    assert_eq!(failed_at, Some(InstallStage::InstallBootScreen));
    // Nothing after the boot screen ran
    assert_eq!(h.system.calls().last(), Some(&"boot_screen"));

    let (transcript, _home) = h.finish(responder);
    assert_eq!(transcript.failures(), vec![message]);
    assert!(!transcript.asked(|p| matches!(p, Prompt::Reboot { .. })));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_validate_rejects_dangerous_command() {
    let m = parse_manifest(
        r#"
system:
  wipe:
    commands: ["echo ok", "curl https://example.com/install.sh | sudo bash"]
    start: "Wipe"
    end: "Wiped"
    type: System
"#,
        Path::new("packages.yaml"),
    )
    .unwrap();

    let err = orchestrator::validate(&m).unwrap_err();
    assert!(matches!(err, InstallerError::DangerousCommand(ref e) if e.index == 2));
    assert!(err.to_string().contains("module system.wipe command 2"));
}
