//! Lifecycle tests for the node supervisor.
//!
//! These tests drive a [`NodeSupervisor`] against a scripted process
//! controller and verify:
//! - Startup, readiness and TLS handling
//! - Retry budgets and unrecoverable nodes
//! - Graceful stop with escalation to a kill
//! - Crash restarts and their cancellation
//! - Update and exit handling
//! - Orphan cleanup, fault injection and hooks

mod common;

use common::*;
use nl_core::process::ProcessController;
use nl_core::state::LifecycleHooks;
use nl_core::storage::PidStore;
use nl_core::NodeError;
use nl_protocol::ipc::Event;
use nl_protocol::node_models::{FaultInjection, NodeState};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn ready_node() -> MockProcessController {
    with_valid_tls(MockProcessController::ready())
}

#[tokio::test]
async fn test_start_reaches_running_with_tls() {
    let mut harness = Harness::new(ready_node());

    harness.supervisor.start().await.unwrap();

    assert_eq!(harness.supervisor.state(), NodeState::Running);
    let tls = harness.supervisor.tls_config().expect("tls config present");
    assert_eq!(tls.port, 8090);
    assert_eq!(tls.ca, CERT_PEM);
    assert_eq!(tls.key, KEY_PEM);

    let events = drain_events(&mut harness.events);
    assert_state_sequence(&events, &[NodeState::Starting, NodeState::Running]);
    assert_eq!(events.last(), Some(&Event::TlsConfigChanged(Some(tls))));

    let pid = harness.controller.last_pid().unwrap();
    assert_eq!(harness.supervisor.pid(), Some(pid));
    assert_eq!(
        harness
            .store
            .load("testnet-PREVIOUS-CARDANO-PID")
            .await
            .unwrap(),
        Some(pid)
    );

    let args = &harness.controller.spawned_args()[0];
    assert_arg_pair(args, "--network", "testnet");
    assert_arg_pair(args, "--tlsca", "/tls/server/ca.crt");
    assert_arg_pair(args, "--logs-prefix", "/logs");
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();

    let result = harness.supervisor.start().await;
    assert!(matches!(
        result,
        Err(NodeError::InvalidTransition {
            from: NodeState::Running,
            to: NodeState::Starting
        })
    ));
    assert_eq!(harness.controller.spawn_count(), 1);
}

#[tokio::test]
async fn test_start_retries_until_unrecoverable() {
    let controller = with_valid_tls(MockProcessController::new(
        SpawnBehavior::ExitBeforeReady { code: 1 },
    ));
    let mut harness = Harness::new(controller);

    let result = harness.supervisor.start().await;

    assert!(matches!(result, Err(NodeError::Fatal(_))));
    assert_eq!(harness.supervisor.state(), NodeState::Unrecoverable);
    assert_eq!(harness.controller.spawn_count(), 3);
    assert_state_sequence(
        &drain_events(&mut harness.events),
        &[
            NodeState::Starting,
            NodeState::Starting,
            NodeState::Starting,
            NodeState::Unrecoverable,
        ],
    );

    // Unrecoverable is terminal.
    assert!(matches!(
        harness.supervisor.start().await,
        Err(NodeError::Fatal(_))
    ));
    assert!(matches!(
        harness.supervisor.restart(true).await,
        Err(NodeError::Fatal(_))
    ));
    assert_eq!(harness.controller.spawn_count(), 3);
}

#[tokio::test]
async fn test_start_succeeds_after_failed_attempt() {
    let controller = ready_node().with_script([SpawnBehavior::ExitBeforeReady { code: 1 }]);
    let harness = Harness::new(controller);

    harness.supervisor.start().await.unwrap();

    assert_eq!(harness.supervisor.state(), NodeState::Running);
    assert_eq!(harness.controller.spawn_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_startup_timeout_kills_and_retries() {
    let controller = ready_node().with_script([SpawnBehavior::Hang]);
    let harness = Harness::new(controller);
    let started = Instant::now();

    harness.supervisor.start().await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(harness.supervisor.state(), NodeState::Running);
    assert_eq!(harness.controller.kill_calls(), vec![1000]);
    assert_eq!(harness.controller.running_pids(), vec![1001]);
}

#[tokio::test]
async fn test_missing_tls_material_errors() {
    let harness = Harness::new(MockProcessController::ready());

    let result = harness.supervisor.start().await;

    assert!(matches!(result, Err(NodeError::Process(_))));
    assert_eq!(harness.supervisor.state(), NodeState::Errored);
    assert_eq!(harness.supervisor.tls_config(), None);
    assert!(harness.controller.running_pids().is_empty());
}

#[tokio::test]
async fn test_malformed_tls_is_protocol_error_and_start_recovers() {
    let controller = MockProcessController::ready()
        .with_file("/tls/client/ca.crt", CERT_PEM)
        .with_file("/tls/client/client.pem", CERT_PEM)
        .with_file("/tls/client/client.key", b"not a key");
    let harness = Harness::new(controller);

    let result = harness.supervisor.start().await;
    assert!(matches!(result, Err(NodeError::Protocol(_))));
    assert_eq!(harness.supervisor.state(), NodeState::Errored);

    harness
        .controller
        .add_file("/tls/client/client.key", KEY_PEM);
    harness.supervisor.start().await.unwrap();
    assert_eq!(harness.supervisor.state(), NodeState::Running);
}

#[tokio::test]
async fn test_stop_is_graceful() {
    let mut harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();
    let pid = harness.controller.last_pid().unwrap();
    drain_events(&mut harness.events);

    harness.supervisor.stop().await.unwrap();

    assert_eq!(harness.supervisor.state(), NodeState::Stopped);
    assert_eq!(harness.supervisor.tls_config(), None);
    assert_eq!(harness.supervisor.pid(), None);
    assert_eq!(harness.controller.term_calls(), vec![pid]);
    assert!(harness.controller.kill_calls().is_empty());

    let events = drain_events(&mut harness.events);
    assert_state_sequence(&events, &[NodeState::Stopping, NodeState::Stopped]);
    assert!(events.contains(&Event::TlsConfigChanged(None)));
    assert_eq!(
        harness
            .store
            .load("testnet-PREVIOUS-CARDANO-PID")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_stop_when_stopped_is_noop() {
    let mut harness = Harness::new(ready_node());
    harness.supervisor.stop().await.unwrap();
    assert_eq!(harness.supervisor.state(), NodeState::Stopped);
    assert!(drain_events(&mut harness.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_escalates_to_kill() {
    let harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();
    let pid = harness.controller.last_pid().unwrap();
    harness.controller.set_ignore_term(true);
    let started = Instant::now();

    harness.supervisor.stop().await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(harness.supervisor.state(), NodeState::Stopped);
    assert_eq!(harness.controller.term_calls(), vec![pid]);
    assert_eq!(harness.controller.kill_calls(), vec![pid]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_errors_when_kill_fails() {
    let harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();
    harness.controller.set_ignore_term(true);
    harness.controller.set_ignore_kill(true);

    let result = harness.supervisor.stop().await;

    assert!(matches!(result, Err(NodeError::Timeout { .. })));
    assert_eq!(harness.supervisor.state(), NodeState::Errored);
}

#[tokio::test(start_paused = true)]
async fn test_crash_restart_policy() {
    let mut harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();

    // First crash restarts immediately.
    harness
        .controller
        .exit(harness.controller.last_pid().unwrap(), 1);
    wait_for_state(&mut harness.events, NodeState::Crashed).await;
    let crashed_at = Instant::now();
    wait_for_state(&mut harness.events, NodeState::Running).await;
    assert!(crashed_at.elapsed() < Duration::from_secs(1));
    assert_eq!(harness.controller.spawn_count(), 2);

    // Later crashes wait for the restart delay.
    harness
        .controller
        .exit(harness.controller.last_pid().unwrap(), 1);
    wait_for_state(&mut harness.events, NodeState::Crashed).await;
    let crashed_at = Instant::now();
    wait_for_state(&mut harness.events, NodeState::Running).await;
    assert!(crashed_at.elapsed() >= Duration::from_secs(3));
    assert_eq!(harness.controller.spawn_count(), 3);

    // Budget of two restarts exhausted.
    harness
        .controller
        .exit(harness.controller.last_pid().unwrap(), 1);
    wait_for_state(&mut harness.events, NodeState::Unrecoverable).await;
    assert_eq!(harness.supervisor.crash_count(), 3);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.controller.spawn_count(), 3);
    assert_eq!(harness.supervisor.state(), NodeState::Unrecoverable);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_stop_cancels_scheduled_restart() {
    let mut harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();

    harness
        .controller
        .exit(harness.controller.last_pid().unwrap(), 1);
    wait_for_state(&mut harness.events, NodeState::Crashed).await;
    wait_for_state(&mut harness.events, NodeState::Running).await;

    harness
        .controller
        .exit(harness.controller.last_pid().unwrap(), 1);
    wait_for_state(&mut harness.events, NodeState::Crashed).await;

    harness.supervisor.stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(harness.controller.spawn_count(), 2);
    assert_eq!(harness.supervisor.state(), NodeState::Stopped);
    assert_eq!(harness.supervisor.crash_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_respawn_after_stop_racing_a_crash() {
    for yields in 0..8 {
        let harness = Harness::new(ready_node());
        harness.supervisor.start().await.unwrap();
        let pid = harness.controller.last_pid().unwrap();

        let controller = harness.controller.clone();
        let crash = tokio::spawn(async move {
            if controller.running_pids().contains(&pid) {
                controller.exit(pid, 1);
            }
        });
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }

        harness.supervisor.stop().await.unwrap();
        crash.await.unwrap();
        let spawned = harness.controller.spawn_count();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(harness.supervisor.state(), NodeState::Stopped, "yields: {yields}");
        assert_eq!(harness.controller.spawn_count(), spawned, "yields: {yields}");
        assert!(harness.controller.running_pids().is_empty(), "yields: {yields}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_startup_in_progress() {
    let controller = with_valid_tls(MockProcessController::new(SpawnBehavior::Hang));
    let mut harness = Harness::new(controller);

    let supervisor = harness.supervisor.clone();
    let starting = tokio::spawn(async move { supervisor.start().await });
    wait_for_state(&mut harness.events, NodeState::Starting).await;

    harness.supervisor.stop().await.unwrap();

    let start_result = starting.await.unwrap();
    assert!(matches!(start_result, Err(NodeError::Cancelled)));
    assert_eq!(harness.supervisor.state(), NodeState::Stopped);
    assert_eq!(harness.controller.spawn_count(), 1);
    assert_eq!(harness.controller.kill_calls(), vec![1000]);
    assert!(harness.controller.running_pids().is_empty());
}

#[tokio::test]
async fn test_orphan_is_killed_before_spawn() {
    let harness = Harness::new(ready_node());
    harness
        .store
        .store("testnet-PREVIOUS-CARDANO-PID", Some(4242))
        .await
        .unwrap();
    harness.controller.add_orphan(4242);

    harness.supervisor.start().await.unwrap();

    assert_eq!(harness.controller.kill_calls(), vec![4242]);
    assert_eq!(harness.supervisor.state(), NodeState::Running);
    assert_eq!(
        harness
            .store
            .load("testnet-PREVIOUS-CARDANO-PID")
            .await
            .unwrap(),
        harness.controller.last_pid()
    );
}

#[tokio::test]
async fn test_reused_pid_is_left_alone() {
    let harness = Harness::new(ready_node());
    harness
        .store
        .store("testnet-PREVIOUS-CARDANO-PID", Some(4242))
        .await
        .unwrap();
    harness.controller.add_foreign_process(4242, "postgres");

    harness.supervisor.start().await.unwrap();

    assert!(harness.controller.kill_calls().is_empty());
    assert!(harness.controller.is_alive(4242));
    assert_eq!(harness.supervisor.state(), NodeState::Running);
    assert_eq!(
        harness
            .store
            .load("testnet-PREVIOUS-CARDANO-PID")
            .await
            .unwrap(),
        harness.controller.last_pid()
    );
}

#[tokio::test]
async fn test_dead_orphan_is_forgotten() {
    let harness = Harness::new(ready_node());
    harness
        .store
        .store("testnet-PREVIOUS-CARDANO-PID", Some(4242))
        .await
        .unwrap();

    harness.supervisor.start().await.unwrap();

    assert!(harness.controller.kill_calls().is_empty());
    assert_eq!(harness.supervisor.state(), NodeState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_surviving_orphan_blocks_start() {
    let harness = Harness::new(ready_node());
    harness
        .store
        .store("testnet-PREVIOUS-CARDANO-PID", Some(4242))
        .await
        .unwrap();
    harness.controller.add_orphan(4242);
    harness.controller.set_ignore_kill(true);

    let result = harness.supervisor.start().await;

    assert!(matches!(result, Err(NodeError::Timeout { .. })));
    assert_eq!(harness.supervisor.state(), NodeState::Errored);
    assert_eq!(harness.controller.spawn_count(), 0);
}

#[tokio::test]
async fn test_faults_apply_on_next_spawn() {
    let harness = Harness::new(ready_node());

    assert!(harness
        .supervisor
        .set_fault(FaultInjection::IgnoreApi, true));
    assert!(!harness
        .supervisor
        .set_fault(FaultInjection::IgnoreApi, true));
    assert_eq!(
        harness.supervisor.active_faults(),
        vec![FaultInjection::IgnoreApi]
    );

    harness.supervisor.start().await.unwrap();
    assert_arg_pair(
        &harness.controller.spawned_args()[0],
        "--fault-injection",
        "FInjIgnoreAPI",
    );

    harness
        .supervisor
        .set_fault(FaultInjection::IgnoreApi, false);
    harness.supervisor.restart(true).await.unwrap();
    assert!(!harness.controller.spawned_args()[1].contains(&"--fault-injection".to_string()));
}

#[tokio::test]
async fn test_update_applied() {
    let mut harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();
    let pid = harness.controller.last_pid().unwrap();

    let supervisor = harness.supervisor.clone();
    let update = tokio::spawn(async move { supervisor.expect_node_update().await });
    wait_for_state(&mut harness.events, NodeState::Updating).await;
    assert_eq!(harness.supervisor.tls_config(), None);

    harness.controller.exit(pid, 20);
    update.await.unwrap().unwrap();

    assert_eq!(harness.supervisor.state(), NodeState::Updated);
    assert!(matches!(
        harness.supervisor.start().await,
        Err(NodeError::InvalidTransition {
            from: NodeState::Updated,
            ..
        })
    ));
}

#[tokio::test]
async fn test_update_with_unexpected_exit_code_is_applied() {
    let mut harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();
    let pid = harness.controller.last_pid().unwrap();

    let supervisor = harness.supervisor.clone();
    let update = tokio::spawn(async move { supervisor.expect_node_update().await });
    wait_for_state(&mut harness.events, NodeState::Updating).await;

    harness.controller.exit(pid, 3);
    update.await.unwrap().unwrap();
    assert_eq!(harness.supervisor.state(), NodeState::Updated);
}

#[tokio::test(start_paused = true)]
async fn test_update_timeout_kills_node() {
    let harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();
    let pid = harness.controller.last_pid().unwrap();

    let result = harness.supervisor.expect_node_update().await;

    assert!(matches!(result, Err(NodeError::Timeout { .. })));
    assert_eq!(harness.supervisor.state(), NodeState::Errored);
    assert_eq!(harness.controller.kill_calls(), vec![pid]);
}

#[tokio::test]
async fn test_update_requires_running_node() {
    let harness = Harness::new(ready_node());
    let result = harness.supervisor.expect_node_update().await;
    assert!(matches!(
        result,
        Err(NodeError::InvalidTransition {
            from: NodeState::Stopped,
            to: NodeState::Updating
        })
    ));
}

#[tokio::test]
async fn test_exit_is_terminal_and_idempotent() {
    let harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();
    let pid = harness.controller.last_pid().unwrap();

    harness.supervisor.exit().await.unwrap();
    assert_eq!(harness.supervisor.state(), NodeState::Exiting);
    assert_eq!(harness.controller.term_calls(), vec![pid]);
    assert!(harness.controller.running_pids().is_empty());

    harness.supervisor.exit().await.unwrap();
    assert_eq!(harness.controller.term_calls(), vec![pid]);
    assert!(harness.supervisor.start().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_restart_cooldown() {
    let harness = Harness::new(ready_node());
    harness.supervisor.start().await.unwrap();

    let before = Instant::now();
    harness.supervisor.restart(false).await.unwrap();
    assert!(before.elapsed() >= Duration::from_secs(5));

    let before = Instant::now();
    harness.supervisor.restart(true).await.unwrap();
    assert!(before.elapsed() < Duration::from_secs(1));

    assert_eq!(harness.supervisor.state(), NodeState::Running);
    assert_eq!(harness.controller.spawn_count(), 3);
}

#[tokio::test]
async fn test_hooks_fire_and_panics_are_contained() {
    let running = Arc::new(AtomicU32::new(0));
    let counter = running.clone();
    let hooks = LifecycleHooks::new()
        .on_running(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .on_stopped(|| panic!("hook exploded"));
    let harness = Harness::with_hooks(test_config(), ready_node(), hooks);

    harness.supervisor.start().await.unwrap();
    harness.supervisor.stop().await.unwrap();
    harness.supervisor.start().await.unwrap();

    assert_eq!(running.load(Ordering::SeqCst), 2);
    assert_eq!(harness.supervisor.state(), NodeState::Running);
}

#[tokio::test]
async fn test_state_watch_follows_transitions() {
    let harness = Harness::new(ready_node());
    let mut states = harness.supervisor.subscribe_state();
    assert_eq!(*states.borrow(), NodeState::Stopped);

    harness.supervisor.start().await.unwrap();
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), NodeState::Running);
}
