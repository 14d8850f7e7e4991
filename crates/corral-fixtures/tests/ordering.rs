//! Ordering guarantees: config server before shards before routers, member
//! reachability before election waiting, designated-primary gating.

mod common;

use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use common::{replica_set_params, replica_set_spec, rig_manual, rig_ready, standalone_spec};

const READY_BUDGET: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_shards_wait_for_config_server_and_routers_for_shards() -> Result<()> {
    let rig = rig_ready();
    let fixture = rig.harness.create_fixture(
        "sharded_cluster",
        json!({
            "config_server": standalone_spec(27019),
            "shards": [standalone_spec(27018), standalone_spec(27028)],
            "routers": [standalone_spec(27017), standalone_spec(27027)],
        }),
    )?;

    fixture.setup().await?;
    fixture.await_ready(READY_BUDGET).await?;
    fixture.teardown(false).await?;

    let config_ready = rig.events.position("ready:27019").unwrap();
    let shard_ready = [
        rig.events.position("ready:27018").unwrap(),
        rig.events.position("ready:27028").unwrap(),
    ];
    let router_ready = [
        rig.events.position("ready:27017").unwrap(),
        rig.events.position("ready:27027").unwrap(),
    ];

    // No shard becomes ready before the config server; no router before
    // every shard.
    for shard in shard_ready {
        assert!(config_ready < shard);
    }
    for router in router_ready {
        for shard in shard_ready {
            assert!(shard < router);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_replica_set_shard_configures_after_config_server() -> Result<()> {
    let rig = rig_ready();
    let fixture = rig.harness.create_fixture(
        "sharded_cluster",
        json!({
            "config_server": standalone_spec(27019),
            "shards": [replica_set_spec("shard0", &[27018, 27028])],
            "routers": [standalone_spec(27017)],
        }),
    )?;

    fixture.setup().await?;
    fixture.await_ready(READY_BUDGET).await?;
    fixture.teardown(false).await?;

    let config_ready = rig.events.position("ready:27019").unwrap();
    let shard_config = rig.events.position("rs_config:shard0").unwrap();
    let router_ready = rig.events.position("ready:27017").unwrap();
    assert!(config_ready < shard_config);
    assert!(shard_config < router_ready);
    Ok(())
}

#[tokio::test]
async fn test_election_wait_begins_after_all_members_reachable() -> Result<()> {
    let rig = rig_ready();
    let fixture = rig
        .harness
        .create_fixture("replica_set", replica_set_params("rs0", &[27017, 27018, 27019]))?;

    fixture.setup().await?;
    fixture.await_ready(READY_BUDGET).await?;
    fixture.teardown(false).await?;

    let config = rig.events.position("rs_config:rs0").unwrap();
    let election = rig.events.position("primary_poll:rs0").unwrap();
    for port in [27017, 27018, 27019] {
        let ready = rig.events.position(&format!("ready:{port}")).unwrap();
        assert!(ready < config, "member {port} was not reachable before configuration");
    }
    assert!(config < election);
    Ok(())
}

#[tokio::test]
async fn test_designated_primary_gates_readiness() -> Result<()> {
    let rig = rig_manual();
    rig.probes.hold_election("rs0");
    let mut params = replica_set_params("rs0", &[27017, 27018]);
    params["expected_primary"] = json!(1);
    let fixture = rig.harness.create_fixture("replica_set", params)?;

    fixture.setup().await?;
    rig.probes.set_ready(27017, true);
    rig.probes.set_ready(27018, true);

    let waiter = {
        let fixture = fixture.clone();
        tokio::spawn(async move { fixture.await_ready(Duration::from_secs(10)).await })
    };

    // Wrong member wins first; the fixture keeps waiting.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let control = rig.probes.controls().into_iter().next().unwrap();
    control.elect(0);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!fixture.is_running());

    // The designated member wins; readiness completes.
    control.elect(1);
    let result = tokio::time::timeout(Duration::from_secs(2), waiter).await??;
    result?;
    assert!(fixture.is_running());

    fixture.teardown(false).await?;
    Ok(())
}
