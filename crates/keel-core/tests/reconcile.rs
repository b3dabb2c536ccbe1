mod common;

use std::time::Duration;

use common::{Harness, big_offer};
use keel_core::{NodeInfo, Readiness};
use keel_mesos::proto::{CallType, SchedulerEvent};
use keel_model::{Role, TaskState};

#[tokio::test]
async fn tick_creates_one_unset_record_per_role() {
    let h = Harness::new(3, 1, 1);
    let cfg = h.runtime.config().snapshot();

    let report = h.runtime.reconciler().tick(&cfg).await.unwrap();
    assert_eq!(report.created.len(), 1);

    let ds = h.records(Role::Datastore).await;
    assert_eq!(ds.len(), 1);
    assert_eq!(ds[0].state, TaskState::Unset);
    assert_eq!(ds[0].id, report.created[0]);
}

#[tokio::test]
async fn unhealthy_datastore_blocks_server_and_agents() {
    let h = Harness::new(1, 1, 2);
    h.probe.set(false, false);

    let report = h.runtime.cycle().await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(h.records(Role::Datastore).await.len(), 1);
    assert!(h.records(Role::Server).await.is_empty());
    assert!(h.records(Role::Agent).await.is_empty());

    // Even with every probe green, nothing runs yet.
    h.probe.set(true, true);
    let report = h.runtime.cycle().await.unwrap();
    assert!(report.created.is_empty());
    assert!(h.records(Role::Server).await.is_empty());
    assert!(h.records(Role::Agent).await.is_empty());
}

#[tokio::test]
async fn healthy_datastore_admits_one_server_but_staging_server_admits_no_agent() {
    let h = Harness::new(1, 1, 2);
    h.runtime.cycle().await.unwrap();
    let ds = h.records(Role::Datastore).await.remove(0);
    h.run_task(&ds, "agent-1").await;

    h.probe.set(true, false);
    let report = h.runtime.cycle().await.unwrap();
    assert_eq!(report.created.len(), 1);
    let servers = h.records(Role::Server).await;
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].state, TaskState::New);

    h.runtime
        .engine()
        .handle_event(SchedulerEvent::Offers(vec![big_offer("o-srv", "agent-2")]))
        .await
        .unwrap();
    assert_eq!(h.records(Role::Server).await[0].state, TaskState::Staging);

    h.probe.set(true, true);
    let report = h.runtime.cycle().await.unwrap();
    assert!(report.created.is_empty());
    assert!(h.records(Role::Agent).await.is_empty());
}

#[tokio::test]
async fn running_healthy_server_admits_agents_one_per_tick() {
    let h = Harness::new(1, 1, 2);
    h.runtime.cycle().await.unwrap();
    let ds = h.records(Role::Datastore).await.remove(0);
    h.run_task(&ds, "agent-1").await;

    h.probe.set(true, false);
    h.runtime.cycle().await.unwrap();
    let srv = h.records(Role::Server).await.remove(0);
    h.run_task(&srv, "agent-2").await;

    h.probe.set(true, true);
    h.runtime.cycle().await.unwrap();
    assert_eq!(h.records(Role::Agent).await.len(), 1);
    h.runtime.cycle().await.unwrap();
    assert_eq!(h.records(Role::Agent).await.len(), 2);
    h.runtime.cycle().await.unwrap();
    assert_eq!(h.records(Role::Agent).await.len(), 2);
}

#[tokio::test]
async fn first_server_build_persists_cluster_url() {
    let h = Harness::new(1, 1, 0);
    h.runtime.cycle().await.unwrap();
    let ds = h.records(Role::Datastore).await.remove(0);
    h.run_task(&ds, "agent-1").await;

    h.probe.set(true, false);
    h.runtime.cycle().await.unwrap();

    let settings = h.runtime.records().settings().await.unwrap();
    assert_eq!(settings.server_url.as_deref(), Some("https://keelserver:6443"));
    assert_eq!(settings.server_port, Some(31_862));
}

#[tokio::test]
async fn failed_write_creates_nothing_and_is_retried() {
    let h = Harness::new(1, 0, 0);
    h.store
        .fail_writes
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let report = h.runtime.cycle().await.unwrap();
    assert!(report.created.is_empty());
    assert!(h.all().await.is_empty());
    assert_eq!(h.client.count(CallType::Accept), 0);

    h.store
        .fail_writes
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let report = h.runtime.cycle().await.unwrap();
    assert_eq!(report.created.len(), 1);
}

#[tokio::test]
async fn terminal_record_is_replaced_next_tick() {
    let h = Harness::new(1, 0, 0);
    h.runtime.cycle().await.unwrap();
    let ds = h.records(Role::Datastore).await.remove(0);
    h.run_task(&ds, "agent-1").await;

    h.runtime
        .engine()
        .handle_event(SchedulerEvent::Update(common::status(
            ds.id.as_str(),
            "agent-1",
            "TASK_FAILED",
        )))
        .await
        .unwrap();
    assert!(h.records(Role::Datastore).await.is_empty());

    let report = h.runtime.cycle().await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_ne!(report.created[0], ds.id);
}

#[tokio::test]
async fn node_pass_forgets_orphans_and_kills_unready() {
    let h = Harness::new(1, 0, 0);
    h.runtime.cycle().await.unwrap();
    let ds = h.records(Role::Datastore).await.remove(0);
    h.run_task(&ds, "agent-1").await;

    *h.nodes.nodes.lock().unwrap() = vec![
        NodeInfo {
            name: "orphan".into(),
            task_id: Some("gone".into()),
            ready: Readiness::Ready,
        },
        NodeInfo {
            name: "sick".into(),
            task_id: Some(ds.id.clone()),
            ready: Readiness::Unknown,
        },
        NodeInfo {
            name: "unlabelled".into(),
            task_id: None,
            ready: Readiness::NotReady,
        },
    ];
    h.client.clear();

    let report = h.runtime.cycle().await.unwrap();
    assert_eq!(report.forgotten, ["orphan"]);
    assert_eq!(report.killed, [ds.id.clone()]);
    assert_eq!(h.client.count(CallType::Kill), 1);
    // A kill never touches the record; the status update will.
    assert_eq!(h.records(Role::Datastore).await[0].state, TaskState::Running);
}

#[tokio::test]
async fn oldest_pending_record_is_matched_first() {
    let h = Harness::new(2, 0, 0);
    h.runtime.cycle().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.runtime.cycle().await.unwrap();

    let before = h.records(Role::Datastore).await;
    assert_eq!(before.len(), 2);
    assert!(before[0].created_at < before[1].created_at);

    h.runtime
        .engine()
        .handle_event(SchedulerEvent::Offers(vec![big_offer("o-1", "agent-1")]))
        .await
        .unwrap();

    let after = h.records(Role::Datastore).await;
    assert_eq!(after[0].id, before[0].id);
    assert_eq!(after[0].state, TaskState::Staging);
    assert_eq!(after[1].state, TaskState::New);
    assert_eq!(h.client.count(CallType::Accept), 1);
}
