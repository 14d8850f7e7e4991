//! Error paths: partial startup failure, readiness timeouts, cancellation by
//! concurrent teardown, stuck-process teardown aggregation, explicit reset.

mod common;

use std::time::Duration;

use anyhow::Result;
use assert_matches::assert_matches;
use serde_json::json;

use common::{replica_set_params, rig_manual, rig_ready, standalone_params, standalone_spec};
use corral_fixtures::{FixtureError, FixtureState};

const READY_BUDGET: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_partial_startup_failure_terminates_started_members() -> Result<()> {
    let rig = rig_ready();
    // Third of four members fails to launch.
    rig.driver.fail_port(27019);
    let fixture = rig.harness.create_fixture(
        "replica_set",
        replica_set_params("rs0", &[27017, 27018, 27019, 27020]),
    )?;

    let result = fixture.setup().await;
    assert_matches!(result, Err(FixtureError::Startup { .. }));
    assert_eq!(fixture.state(), FixtureState::Failed);

    // The first two members were started and are confirmed terminated.
    assert_eq!(rig.driver.launched_ports(), vec![27017, 27018]);
    for port in [27017, 27018] {
        let handle = rig.driver.handle_for(port).unwrap();
        assert!(handle.is_terminated());
        assert!(handle.was_forced());
    }
    // The fourth member was never launched.
    assert_eq!(rig.events.position("launch:27020"), None);
    Ok(())
}

#[tokio::test]
async fn test_master_slave_rolls_back_master_when_slave_fails() -> Result<()> {
    let rig = rig_ready();
    rig.driver.fail_port(27018);
    let fixture = rig.harness.create_fixture(
        "master_slave",
        json!({"master": standalone_spec(27017), "slave": standalone_spec(27018)}),
    )?;

    assert_matches!(fixture.setup().await, Err(FixtureError::Startup { .. }));
    assert!(rig.driver.handle_for(27017).unwrap().is_terminated());
    Ok(())
}

#[tokio::test]
async fn test_await_ready_timeout_marks_failed() -> Result<()> {
    let rig = rig_manual();
    let fixture = rig
        .harness
        .create_fixture("standalone", standalone_params(27017))?;

    fixture.setup().await?;
    let result = fixture.await_ready(Duration::from_millis(100)).await;
    assert_matches!(
        result,
        Err(FixtureError::Timeout { cancelled: false, .. })
    );
    assert_eq!(fixture.state(), FixtureState::Failed);

    // The caller tears down after a timeout; no process leaks.
    fixture.teardown(true).await?;
    assert_eq!(fixture.state(), FixtureState::Stopped);
    assert!(rig.driver.handle_for(27017).unwrap().is_terminated());
    Ok(())
}

#[tokio::test]
async fn test_process_death_during_wait_is_a_startup_error() -> Result<()> {
    let rig = rig_manual();
    let fixture = rig
        .harness
        .create_fixture("standalone", standalone_params(27017))?;

    fixture.setup().await?;
    rig.driver.handle_for(27017).unwrap().kill();

    let result = fixture.await_ready(READY_BUDGET).await;
    assert_matches!(result, Err(FixtureError::Startup { .. }));
    assert_eq!(fixture.state(), FixtureState::Failed);
    Ok(())
}

#[tokio::test]
async fn test_teardown_cancels_inflight_wait() -> Result<()> {
    let rig = rig_manual();
    let fixture = rig
        .harness
        .create_fixture("standalone", standalone_params(27017))?;
    fixture.setup().await?;

    let waiter = {
        let fixture = fixture.clone();
        tokio::spawn(async move { fixture.await_ready(Duration::from_secs(60)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    fixture.teardown(false).await?;

    // The wait returns within a bounded grace period, not after its full
    // 60s budget.
    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await??;
    let err = result.unwrap_err();
    assert!(err.is_cancelled(), "expected cancellation, got: {err}");

    assert_eq!(fixture.state(), FixtureState::Stopped);
    assert!(rig.driver.handle_for(27017).unwrap().is_terminated());
    Ok(())
}

#[tokio::test]
async fn test_teardown_cancels_composite_wait() -> Result<()> {
    let rig = rig_manual();
    let fixture = rig
        .harness
        .create_fixture("replica_set", replica_set_params("rs0", &[27017, 27018]))?;
    fixture.setup().await?;

    let waiter = {
        let fixture = fixture.clone();
        tokio::spawn(async move { fixture.await_ready(Duration::from_secs(60)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    fixture.teardown(false).await?;

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await??;
    assert!(result.unwrap_err().is_cancelled());
    for handle in rig.driver.handles() {
        assert!(handle.is_terminated());
    }
    Ok(())
}

#[tokio::test]
async fn test_failed_fixture_requires_reset_before_setup() -> Result<()> {
    let rig = rig_ready();
    rig.driver.fail_port(27017);
    let fixture = rig
        .harness
        .create_fixture("standalone", standalone_params(27017))?;

    assert_matches!(fixture.setup().await, Err(FixtureError::Startup { .. }));
    assert_eq!(fixture.state(), FixtureState::Failed);

    // Starting must not be re-entered from Failed.
    assert_matches!(
        fixture.setup().await,
        Err(FixtureError::InvalidState { from: FixtureState::Failed, .. })
    );

    fixture.reset()?;
    assert_eq!(fixture.state(), FixtureState::Stopped);

    rig.driver.clear_failures();
    fixture.setup().await?;
    fixture.await_ready(READY_BUDGET).await?;
    assert!(fixture.is_running());
    fixture.teardown(false).await?;
    Ok(())
}

#[tokio::test]
async fn test_stuck_sibling_does_not_leak_the_others() -> Result<()> {
    let rig = rig_ready();
    let fixture = rig
        .harness
        .create_fixture("replica_set", replica_set_params("rs0", &[27017, 27018, 27019]))?;

    fixture.setup().await?;
    fixture.await_ready(READY_BUDGET).await?;
    rig.driver.handle_for(27018).unwrap().fail_terminate();

    let result = fixture.teardown(false).await;
    let err = result.unwrap_err();
    assert_matches!(&err, FixtureError::Teardown { failures, .. } if failures.len() == 1);

    // Siblings of the stuck member were still released.
    assert!(rig.driver.handle_for(27017).unwrap().is_terminated());
    assert!(rig.driver.handle_for(27019).unwrap().is_terminated());
    assert!(!rig.driver.handle_for(27018).unwrap().is_terminated());
    Ok(())
}
