//! Integration tests for host reconciliation
//!
//! These tests drive the reconciler against the in-memory and file
//! back-ends and check:
//! - Convergence to every requested state
//! - Idempotence of repeated runs
//! - Recreate and immutable option handling
//! - Partial failure reporting and recovery on re-run
//! - Timeouts, cancellation and check mode

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use rustible_machine::backend::{BackendError, MemoryBackend, Operation, ProviderErrorKind};
use rustible_machine::error::Error;
use rustible_machine::machine::MachineState;
use rustible_machine::reconcile::{Action, ActionLog};

// ============================================================================
// Convergence
// ============================================================================

#[tokio::test]
async fn test_create_droplet_without_auto_start() {
    let backend = manual_start_backend();
    let result = reconciler()
        .reconcile(&droplet("m1"), &backend)
        .await
        .unwrap();

    assert!(result.changed);
    assert_eq!(
        result.actions.operations(),
        vec![Operation::Create, Operation::Start]
    );
    let host = result.host.unwrap();
    assert!(host.running);
    assert_eq!(host.driver_name, "digitalocean");
    assert_eq!(host.driver_options.get("region"), Some(&json!("nyc3")));
}

#[tokio::test]
async fn test_create_droplet_with_auto_start() {
    let backend = MemoryBackend::new();
    let result = reconciler()
        .reconcile(&droplet("m1"), &backend)
        .await
        .unwrap();

    assert_eq!(result.actions.operations(), vec![Operation::Create]);
    assert!(backend.host("m1").unwrap().running);
}

#[tokio::test]
async fn test_create_stopped_host_with_auto_start() {
    let backend = MemoryBackend::new();
    let spec = vbox("m1").with_state(MachineState::Stopped);
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert_eq!(
        result.actions.operations(),
        vec![Operation::Create, Operation::Stop]
    );
    assert!(!backend.host("m1").unwrap().running);
}

#[tokio::test]
async fn test_present_leaves_run_state_alone() {
    let backend = MemoryBackend::new().with_host(observed_vbox("m1", false));
    let spec = vbox("m1").with_state(MachineState::Present);
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert!(!result.changed);
    assert!(backend.mutating_calls().is_empty());
    assert!(!backend.host("m1").unwrap().running);
}

#[tokio::test]
async fn test_every_state_converges_from_every_start() {
    for initial in [None, Some(false), Some(true)] {
        for state in ALL_STATES {
            let backend = MemoryBackend::new();
            if let Some(running) = initial {
                backend.insert(observed_vbox("m1", running));
            }

            let spec = vbox("m1").with_state(state);
            let result = reconciler()
                .reconcile(&spec, &backend)
                .await
                .unwrap_or_else(|e| panic!("{:?} from {:?}: {}", state, initial, e));

            assert!(
                state.is_satisfied_by(backend.host("m1").as_ref()),
                "{:?} from {:?} ended as {:?}",
                state,
                initial,
                backend.host("m1")
            );
            assert_eq!(result.host, backend.host("m1"));
        }
    }
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    for state in ALL_STATES {
        let backend = manual_start_backend();
        let spec = droplet("m1").with_state(state);

        reconciler().reconcile(&spec, &backend).await.unwrap();
        backend.clear_calls();
        let second = reconciler().reconcile(&spec, &backend).await.unwrap();

        assert!(!second.changed, "{:?} changed on re-run", state);
        assert!(second.actions.is_empty());
        assert!(backend.mutating_calls().is_empty());
    }
}

#[tokio::test]
async fn test_absent_on_missing_host_is_a_no_op() {
    let backend = MemoryBackend::new();
    let spec = droplet("ghost").with_state(MachineState::Absent);
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert!(!result.changed);
    assert!(result.host.is_none());
    assert_eq!(backend.calls(), vec![Operation::Describe, Operation::Describe]);
}

#[tokio::test]
async fn test_absent_stops_before_removing() {
    let backend = MemoryBackend::new().with_host(observed_vbox("m1", true));
    let spec = vbox("m1").with_state(MachineState::Absent);
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert_eq!(result.actions, ActionLog::from(vec![Action::Stop, Action::Remove]));
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_absent_with_force_remove_still_stops_first() {
    let backend = MemoryBackend::new()
        .with_force_remove(true)
        .with_host(observed_vbox("m1", true));
    let spec = vbox("m1").with_state(MachineState::Absent);
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert_eq!(
        result.actions.operations(),
        vec![Operation::Stop, Operation::Remove]
    );
}

// ============================================================================
// Recreate, restart and option drift
// ============================================================================

#[tokio::test]
async fn test_recreate_running_host() {
    let backend = manual_start_backend().with_host(observed_vbox("m1", true));
    let spec = vbox("m1").with_recreate(true);
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert_eq!(
        result.actions.operations(),
        vec![
            Operation::Stop,
            Operation::Remove,
            Operation::Create,
            Operation::Start
        ]
    );
    assert!(backend.host("m1").unwrap().running);
}

#[tokio::test]
async fn test_recreate_is_not_idempotent() {
    let backend = MemoryBackend::new().with_host(observed_vbox("m1", false));
    let spec = vbox("m1")
        .with_state(MachineState::Present)
        .with_recreate(true);

    let first = reconciler().reconcile(&spec, &backend).await.unwrap();
    let second = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert_eq!(
        first.actions.operations(),
        vec![Operation::Remove, Operation::Create]
    );
    assert!(second.changed);
}

#[tokio::test]
async fn test_restart_running_host() {
    let backend = MemoryBackend::new().with_host(observed_vbox("m1", true));
    let spec = vbox("m1").with_restart(true);
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert_eq!(result.actions, ActionLog::from(vec![Action::Stop, Action::Start]));
    assert!(backend.host("m1").unwrap().running);
}

#[tokio::test]
async fn test_restart_stopped_host_only_starts() {
    let backend = MemoryBackend::new().with_host(observed_vbox("m1", false));
    let spec = vbox("m1").with_restart(true);
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert_eq!(result.actions, ActionLog::from(vec![Action::Start]));
}

#[tokio::test]
async fn test_immutable_option_change_recreates() {
    let backend = MemoryBackend::new().with_host(observed_droplet("m1", true));
    let spec = droplet("m1").with_option("region", json!("ams3"));
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert_eq!(
        result.actions.operations(),
        vec![Operation::Stop, Operation::Remove, Operation::Create]
    );
    let diff = result.diff.expect("drift should be reported");
    assert_eq!(diff.changes.len(), 1);
    assert_eq!(diff.changes[0].option, "region");
    assert_eq!(
        backend.host("m1").unwrap().driver_options.get("region"),
        Some(&json!("ams3"))
    );
}

#[tokio::test]
async fn test_updatable_option_change_updates_in_place() {
    let backend = MemoryBackend::new().with_host(observed_droplet("m1", true));
    let spec = droplet("m1").with_option("ipv6", json!(true));
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert_eq!(result.actions.operations(), vec![Operation::Update]);
    let host = result.host.unwrap();
    assert_eq!(host.config_version, 2);
    assert!(host.running);
    assert_eq!(host.driver_options.get("ipv6"), Some(&json!(true)));

    let again = reconciler().reconcile(&spec, &backend).await.unwrap();
    assert!(!again.changed);
}

#[tokio::test]
async fn test_driver_change_recreates() {
    let backend = MemoryBackend::new().with_host(observed_vbox("m1", false));
    let spec = droplet("m1").with_state(MachineState::Present);
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert_eq!(
        result.actions.operations(),
        vec![Operation::Remove, Operation::Create]
    );
    assert_eq!(backend.host("m1").unwrap().driver_name, "digitalocean");
    assert!(!backend.calls().contains(&Operation::Capabilities));
}

#[tokio::test]
async fn test_loosely_equal_values_are_not_drift() {
    let backend = MemoryBackend::new().with_host(observed_vbox("m1", true));
    let spec = vbox("m1").with_option("memory", json!("1024"));
    let result = reconciler().reconcile(&spec, &backend).await.unwrap();

    assert!(!result.changed);
    assert!(result.diff.is_none());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_partial_failure_reports_completed_actions() {
    let backend = MemoryBackend::new().with_host(observed_vbox("m1", true));
    backend.fail_next(
        Operation::Remove,
        BackendError::provider(Operation::Remove, ProviderErrorKind::Rejected, "disk busy"),
    );
    let spec = vbox("m1").with_recreate(true);

    let err = reconciler().reconcile(&spec, &backend).await.unwrap_err();
    assert_eq!(err.host, "m1");
    assert_eq!(err.completed, ActionLog::from(vec![Action::Stop]));
    assert_eq!(err.failed_action, Some(Action::Remove));
    assert!(matches!(err.error, Error::Backend(BackendError::Provider(_))));
    assert_eq!(err.exit_code(), 2);

    // No rollback: the host stays stopped.
    assert!(!backend.host("m1").unwrap().running);

    let retry = reconciler().reconcile(&spec, &backend).await.unwrap();
    assert_eq!(
        retry.actions.operations(),
        vec![Operation::Remove, Operation::Create]
    );
    assert!(backend.host("m1").unwrap().running);
}

#[tokio::test]
async fn test_failure_stops_remaining_steps() {
    let backend = manual_start_backend();
    backend.fail_next(
        Operation::Create,
        BackendError::provider(Operation::Create, ProviderErrorKind::Rejected, "quota"),
    );

    let err = reconciler()
        .reconcile(&droplet("m1"), &backend)
        .await
        .unwrap_err();
    assert!(err.completed.is_empty());
    assert_eq!(err.failed_action.map(|a| a.operation()), Some(Operation::Create));
    assert_eq!(backend.mutating_calls(), vec![Operation::Create]);
}

#[tokio::test]
async fn test_unreachable_backend_fails_before_planning() {
    let backend = MemoryBackend::new();
    backend.fail_next(
        Operation::Describe,
        BackendError::Unreachable("connection refused".to_string()),
    );

    let err = reconciler()
        .reconcile(&droplet("m1"), &backend)
        .await
        .unwrap_err();
    assert!(err.failed_action.is_none());
    assert!(err.completed.is_empty());
    assert_eq!(err.exit_code(), 3);
    assert!(backend.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_invalid_spec_makes_no_backend_calls() {
    let backend = MemoryBackend::new();
    let spec = vbox("m1")
        .with_state(MachineState::Stopped)
        .with_restart(true);

    let err = reconciler().reconcile(&spec, &backend).await.unwrap_err();
    assert!(err.error.is_config_error());
    assert_eq!(err.exit_code(), 4);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let backend = MemoryBackend::new().with_latency(Duration::from_millis(200));
    let err = reconciler()
        .with_timeout(Duration::from_millis(20))
        .reconcile(&droplet("m1"), &backend)
        .await
        .unwrap_err();

    match err.error {
        Error::Backend(BackendError::Timeout { operation, timeout }) => {
            assert_eq!(operation, Operation::Describe);
            assert_eq!(timeout, Duration::from_millis(20));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let backend = MemoryBackend::new();

    let err = reconciler()
        .with_cancellation(cancel)
        .reconcile(&droplet("m1"), &backend)
        .await
        .unwrap_err();
    assert!(matches!(err.error, Error::Cancelled));
    assert_eq!(err.exit_code(), 130);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_between_steps_keeps_completed_prefix() {
    let backend = CancelAfter::new(
        MemoryBackend::new().with_host(observed_vbox("m1", true)),
        Operation::Stop,
    );
    let spec = vbox("m1").with_recreate(true);

    let err = reconciler()
        .with_cancellation(backend.token.clone())
        .reconcile(&spec, &backend)
        .await
        .unwrap_err();

    assert!(matches!(err.error, Error::Cancelled));
    assert_eq!(err.completed, ActionLog::from(vec![Action::Stop]));
    assert!(err.failed_action.is_none());
    assert_eq!(backend.inner.mutating_calls(), vec![Operation::Stop]);
    assert!(!backend.inner.host("m1").unwrap().running);
}

// ============================================================================
// Check mode
// ============================================================================

#[tokio::test]
async fn test_check_mode_reports_plan_only() {
    let backend = MemoryBackend::new().with_host(observed_droplet("m1", true));
    let spec = droplet("m1").with_option("region", json!("ams3"));
    let result = reconciler()
        .with_check_mode(true)
        .reconcile(&spec, &backend)
        .await
        .unwrap();

    assert!(result.check_mode);
    assert!(result.changed);
    assert_eq!(
        result.actions.operations(),
        vec![
            Operation::Stop,
            Operation::Remove,
            Operation::Create,
            Operation::Start
        ]
    );
    assert!(backend.mutating_calls().is_empty());
    assert_eq!(backend.host("m1"), Some(observed_droplet("m1", true)));
}

#[tokio::test]
async fn test_check_mode_on_converged_host() {
    let backend = MemoryBackend::new().with_host(observed_droplet("m1", true));
    let result = reconciler()
        .with_check_mode(true)
        .reconcile(&droplet("m1"), &backend)
        .await
        .unwrap();

    assert!(!result.changed);
    assert!(result.actions.is_empty());
}

// ============================================================================
// File back-end
// ============================================================================

#[tokio::test]
async fn test_file_backend_end_to_end() {
    let workspace = Workspace::new();
    let spec = droplet("m1").with_state(MachineState::Stopped);

    let created = reconciler()
        .reconcile(&spec, &workspace.file_backend())
        .await
        .unwrap();
    assert_eq!(
        created.actions.operations(),
        vec![Operation::Create, Operation::Stop]
    );
    assert!(workspace.state_file().exists());

    // A fresh back-end over the same file sees the persisted host.
    let again = reconciler()
        .reconcile(&spec, &workspace.file_backend())
        .await
        .unwrap();
    assert!(!again.changed);

    let removed = reconciler()
        .reconcile(
            &spec.clone().with_state(MachineState::Absent),
            &workspace.file_backend(),
        )
        .await
        .unwrap();
    assert_eq!(removed.actions.operations(), vec![Operation::Remove]);
    assert!(workspace.file_backend().load().unwrap().machines.is_empty());
}
