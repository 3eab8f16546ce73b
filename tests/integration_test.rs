//! Integration tests for TaskFleet
//!
//! These tests drive the full pipeline against real git repositories:
//! manager -> worker -> shadow branch -> Silent Loop -> validators -> merge.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use taskfleet::domain::{Priority, ticket_id, ticket_status};
use taskfleet::events::{EventBus, FleetEvent};
use taskfleet::r#loop::LoopConfig;
use taskfleet::shadow::{MergeStrategy, ShadowGit, ShadowGitConfig};
use taskfleet::validate::{CommandValidator, ValidatorChain};
use taskfleet::worker::{Executor, LoopExecutor};
use taskfleet::{Manager, Patch, TicketStatus};
use tempfile::TempDir;
use tokio::process::Command;

async fn git(args: &[&str], dir: &Path) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Init a repo on `main` with one committed file
async fn setup_repo(dir: &Path) {
    git(&["init", "-b", "main"], dir).await;
    git(&["config", "user.email", "fleet@test.local"], dir).await;
    git(&["config", "user.name", "Fleet Test"], dir).await;
    tokio::fs::write(dir.join("README.md"), "# fixture\n").await.unwrap();
    git(&["add", "-A"], dir).await;
    git(&["commit", "-m", "initial"], dir).await;
}

async fn setup_manager() -> (TempDir, TempDir, Manager) {
    let repo = TempDir::new().expect("Failed to create temp dir");
    let shadows = TempDir::new().expect("Failed to create temp dir");
    setup_repo(repo.path()).await;

    let shadow = Arc::new(ShadowGit::new(ShadowGitConfig {
        repo_root: repo.path().to_path_buf(),
        shadow_dir: shadows.path().to_path_buf(),
        branch_prefix: "shadow".to_string(),
    }));
    (repo, shadows, Manager::new(shadow))
}

/// Chain that passes once the target file contains the given marker
fn marker_chain(marker: &str) -> ValidatorChain {
    ValidatorChain::new().register(CommandValidator::new(
        "marker",
        "grep",
        vec!["-q".into(), marker.into()],
    ))
}

fn loop_executor(manager: &Manager, target: &str, patches: Vec<Patch>, chain: ValidatorChain) -> Arc<dyn Executor> {
    Arc::new(
        LoopExecutor::new(manager.shadow().clone(), chain, target, patches)
            .with_events(manager.events().clone()),
    )
}

// =============================================================================
// End-to-End Pipeline
// =============================================================================

#[tokio::test]
async fn test_ticket_to_merged_commit() {
    let (repo, _shadows, manager) = setup_manager().await;
    let shadow = manager.shadow().clone();

    let before = shadow.commit_count("main").await.unwrap();
    let ticket = manager.create_ticket("write the module", Priority::High);

    let executor = loop_executor(
        &manager,
        "module.py",
        vec![Patch::set("VERSION = \"1.0\"\n")],
        marker_chain("VERSION"),
    );
    let result = manager.delegate(ticket.clone(), executor).await;

    assert!(result.success, "pipeline should converge: {:?}", result);
    assert_eq!(ticket_status(&ticket), TicketStatus::Completed);

    // The worker branch carries the commit; squash it back onto main
    let shadows = shadow.list_shadows().await.unwrap();
    assert_eq!(shadows.len(), 1);
    manager.integrate(&shadows[0], "main").await.unwrap();

    let after = shadow.commit_count("main").await.unwrap();
    assert_eq!(after, before + 1, "squash integration adds exactly one commit");

    let merged = tokio::fs::read_to_string(repo.path().join("module.py")).await.unwrap();
    assert!(merged.contains("VERSION"));
}

#[tokio::test]
async fn test_non_converging_loop_fails_ticket() {
    let (_repo, _shadows, manager) = setup_manager().await;
    let ticket = manager.create_ticket("impossible", Priority::Normal);

    // Validator that never passes
    let chain = ValidatorChain::new().register(CommandValidator::new("never", "false", vec![]));
    let executor = Arc::new(
        LoopExecutor::new(manager.shadow().clone(), chain, "out.txt", vec![Patch::set("attempt\n")])
            .with_config(LoopConfig {
                max_iterations: 2,
                stall_threshold: 0,
                ..Default::default()
            }),
    );

    let result = manager.delegate(ticket.clone(), executor).await;

    assert!(!result.success);
    assert_eq!(ticket_status(&ticket), TicketStatus::Failed);
    assert!(result.error.is_some());
}

// =============================================================================
// Parallel Delegation
// =============================================================================

#[tokio::test]
async fn test_parallel_workers_stay_isolated() {
    let (repo, _shadows, manager) = setup_manager().await;
    let shadow = manager.shadow().clone();

    let tickets = vec![
        manager.create_ticket("write alpha", Priority::Normal),
        manager.create_ticket("write beta", Priority::Normal),
    ];
    let alpha_id = ticket_id(&tickets[0]);

    let results = manager
        .delegate_parallel(tickets.clone(), |ticket| {
            if ticket_id(ticket) == alpha_id {
                loop_executor(&manager, "alpha.txt", vec![Patch::set("alpha done\n")], marker_chain("alpha"))
            } else {
                loop_executor(&manager, "beta.txt", vec![Patch::set("beta done\n")], marker_chain("beta"))
            }
        })
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success), "both workers should converge");
    assert_eq!(results[0].ticket_id, alpha_id, "results keep input order");

    // Two distinct branches, each holding only its own file
    let shadows = shadow.list_shadows().await.unwrap();
    assert_eq!(shadows.len(), 2);
    for branch in &shadows {
        let has_alpha = branch.path.join("alpha.txt").exists();
        let has_beta = branch.path.join("beta.txt").exists();
        assert!(has_alpha != has_beta, "each branch sees exactly one worker's file");
    }

    // Both integrate cleanly since they touch disjoint files
    for branch in &shadows {
        manager.integrate(branch, "main").await.unwrap();
    }
    assert!(repo.path().join("alpha.txt").exists());
    assert!(repo.path().join("beta.txt").exists());
}

// =============================================================================
// Merge Strategies
// =============================================================================

#[tokio::test]
async fn test_rebase_integration_keeps_commits() {
    let (_repo, _shadows, manager) = setup_manager().await;
    let manager = manager.with_default_strategy(MergeStrategy::Rebase);
    let shadow = manager.shadow().clone();

    let before = shadow.commit_count("main").await.unwrap();
    let ticket = manager.create_ticket("two steps", Priority::Normal);

    let executor = loop_executor(
        &manager,
        "steps.txt",
        vec![Patch::set("step one done\n")],
        marker_chain("done"),
    );
    let result = manager.delegate(ticket, executor).await;
    assert!(result.success);

    // Second commit on the worker branch, outside the loop
    let shadows = shadow.list_shadows().await.unwrap();
    let branch = &shadows[0];
    tokio::fs::write(branch.path.join("notes.txt"), "follow-up\n").await.unwrap();
    shadow.commit(branch, "follow-up notes", false).await.unwrap();

    manager.integrate(branch, "main").await.unwrap();

    let after = shadow.commit_count("main").await.unwrap();
    assert_eq!(after, before + 2, "rebase keeps the individual branch commits");
}

// =============================================================================
// Event Stream
// =============================================================================

#[tokio::test]
async fn test_lifecycle_events_are_broadcast() {
    let (_repo, _shadows, manager) = setup_manager().await;
    let events: Arc<EventBus> = manager.events().clone();
    let mut rx = events.subscribe();

    let ticket = manager.create_ticket("observable", Priority::Normal);
    let executor = loop_executor(&manager, "obs.txt", vec![Patch::set("seen\n")], marker_chain("seen"));
    let result = manager.delegate(ticket, executor).await;
    assert!(result.success);

    let mut seen = Vec::new();
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        seen.push(event.event_type().to_string());
        if matches!(event, FleetEvent::TicketCompleted { .. }) {
            break;
        }
    }

    for expected in [
        "TicketCreated",
        "TicketDelegated",
        "WorkerSpawned",
        "LoopStarted",
        "LoopIteration",
        "ShadowCommit",
        "LoopFinished",
        "TicketCompleted",
    ] {
        assert!(seen.contains(&expected.to_string()), "missing {expected} in {seen:?}");
    }

    // Ordering: delegation precedes spawning precedes loop start
    let pos = |name: &str| seen.iter().position(|e| e == name).unwrap();
    assert!(pos("TicketDelegated") < pos("WorkerSpawned"));
    assert!(pos("WorkerSpawned") < pos("LoopStarted"));
    assert!(pos("LoopFinished") < pos("TicketCompleted"));
}
