//! Integration Tests for the Scheduler
//!
//! End-to-end scenarios through the scheduler: cron cadence on a manual
//! clock, event routing with filters, single-shot registrations, and
//! parent/child invocation lineage.

use chrono::Duration as ChronoDuration;
use overseer_core::{
    Agent, AgentStatus, ConfigMap, IntervalSchedule, InvocationOutcome, RegistrationOptions,
    RunId, RuntimeLimits, Trigger, TriggerKind,
};
use overseer_runtime::{RuntimeError, Scheduler};
use overseer_testing::{MockAgent, agent_type, mock_catalog, owner, test_clock};
use serde_json::json;
use std::sync::Arc;

fn data(value: serde_json::Value) -> ConfigMap {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn limits() -> RuntimeLimits {
    RuntimeLimits {
        spawn_rate_limit_per_hour: None,
        ..RuntimeLimits::default()
    }
}

#[tokio::test]
async fn test_hourly_cron_fires_once_per_period() {
    let agent = MockAgent::succeeding("tick");
    let clock = test_clock();
    let scheduler = Scheduler::builder(mock_catalog([(
        "scout",
        Arc::new(agent.clone()) as Arc<dyn Agent>,
    )]))
    .limits(limits())
    .clock(Arc::new(clock.clone()))
    .build()
    .unwrap();

    let registration = scheduler
        .register(
            owner("alice"),
            agent_type("scout"),
            RegistrationOptions::new()
                .with_trigger(Trigger::cron(IntervalSchedule::parse("hourly").unwrap())),
        )
        .await
        .unwrap();

    // (minutes advanced before the tick, dispatches expected)
    let steps = [(0, 1), (10, 0), (49, 0), (1, 1), (30, 0), (30, 1)];
    for (minutes, expected) in steps {
        clock.advance(ChronoDuration::minutes(minutes));
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.cron_dispatches, expected, "after +{minutes}m");
        scheduler.wait_idle().await;
    }

    assert_eq!(agent.call_count(), 3);
    let stored = scheduler.registry().require(&registration.id).await.unwrap();
    assert_eq!(stored.invocation_count, 3);
    match &stored.triggers[0] {
        Trigger::Cron { last_run, .. } => assert_eq!(*last_run, Some(clock_now(&scheduler))),
        other => panic!("unexpected trigger {other:?}"),
    }
    let input = agent.last_input().unwrap();
    assert_eq!(input.context.triggered_by.kind, TriggerKind::Cron);
    assert_eq!(input.context.triggered_by.reference, "hourly");
}

fn clock_now(scheduler: &Scheduler) -> chrono::DateTime<chrono::Utc> {
    scheduler.registry().now()
}

#[tokio::test]
async fn test_events_route_to_matching_filters_only() {
    let english = MockAgent::succeeding("en");
    let any = MockAgent::succeeding("any");
    let scheduler = Scheduler::builder(mock_catalog([
        ("english", Arc::new(english.clone()) as Arc<dyn Agent>),
        ("any", Arc::new(any.clone()) as Arc<dyn Agent>),
    ]))
    .limits(limits())
    .clock(Arc::new(test_clock()))
    .build()
    .unwrap();

    scheduler
        .register(
            owner("alice"),
            agent_type("english"),
            RegistrationOptions::new().with_trigger(Trigger::event_filtered(
                "news.published",
                data(json!({"lang": "en"})),
            )),
        )
        .await
        .unwrap();
    scheduler
        .register(
            owner("alice"),
            agent_type("any"),
            RegistrationOptions::new().with_trigger(Trigger::event("news.published")),
        )
        .await
        .unwrap();

    scheduler.emit("news.published", data(json!({"lang": "en", "id": 1})));
    scheduler.emit("news.published", data(json!({"lang": "de", "id": 2})));
    scheduler.emit("news.deleted", data(json!({"lang": "en"})));

    let report = scheduler.tick().await.unwrap();
    scheduler.wait_idle().await;

    assert_eq!(report.events_processed, 3);
    assert_eq!(report.event_dispatches, 3);
    assert_eq!(english.call_count(), 1);
    assert_eq!(any.call_count(), 2);

    let input = english.last_input().unwrap();
    assert_eq!(input.payload["id"], 1);
    assert_eq!(input.context.triggered_by.kind, TriggerKind::Event);
    assert_eq!(input.context.triggered_by.reference, "news.published");

    // The queue was drained.
    let report = scheduler.tick().await.unwrap();
    assert_eq!(report.events_processed, 0);
}

#[tokio::test]
async fn test_single_shot_registration_stops_after_first_run() {
    let agent = MockAgent::succeeding("once");
    let scheduler = Scheduler::builder(mock_catalog([(
        "scout",
        Arc::new(agent.clone()) as Arc<dyn Agent>,
    )]))
    .limits(limits())
    .clock(Arc::new(test_clock()))
    .build()
    .unwrap();

    let registration = scheduler
        .register(
            owner("alice"),
            agent_type("scout"),
            RegistrationOptions::new()
                .with_max_invocations(1)
                .with_trigger(Trigger::event("ping")),
        )
        .await
        .unwrap();

    let result = scheduler
        .invoke(&registration.id, ConfigMap::new())
        .await
        .unwrap();
    assert_eq!(result.outcome, InvocationOutcome::Success);
    assert_eq!(result.triggered_by.kind, TriggerKind::Manual);
    assert_eq!(result.triggered_by.reference, "alice");

    let stored = scheduler.registry().require(&registration.id).await.unwrap();
    assert_eq!(stored.status, AgentStatus::Stopped);
    assert_eq!(stored.invocation_count, 1);

    let err = scheduler
        .invoke(&registration.id, ConfigMap::new())
        .await
        .unwrap_err();
    assert!(err.is_rejection());

    // A stopped registration ignores events.
    scheduler.emit("ping", ConfigMap::new());
    let report = scheduler.tick().await.unwrap();
    assert_eq!(report.event_dispatches, 0);
    assert_eq!(agent.call_count(), 1);
}

#[tokio::test]
async fn test_expiry_runs_before_triggers() {
    let agent = MockAgent::succeeding("late");
    let clock = test_clock();
    let scheduler = Scheduler::builder(mock_catalog([(
        "scout",
        Arc::new(agent.clone()) as Arc<dyn Agent>,
    )]))
    .limits(limits())
    .clock(Arc::new(clock.clone()))
    .build()
    .unwrap();

    let registration = scheduler
        .register(
            owner("alice"),
            agent_type("scout"),
            RegistrationOptions::new()
                .expires_in_days(1)
                .with_trigger(Trigger::cron(IntervalSchedule::Daily))
                .with_trigger(Trigger::event("ping")),
        )
        .await
        .unwrap();

    clock.advance(ChronoDuration::days(2));
    scheduler.emit("ping", ConfigMap::new());
    let report = scheduler.tick().await.unwrap();
    scheduler.wait_idle().await;

    assert_eq!(report.expired, vec![registration.id.clone()]);
    assert_eq!(report.dispatched(), 0);
    assert_eq!(agent.call_count(), 0);
    assert_eq!(
        scheduler
            .registry()
            .require(&registration.id)
            .await
            .unwrap()
            .status,
        AgentStatus::Expired
    );
}

#[tokio::test]
async fn test_child_invocation_carries_parent_lineage() {
    let child_agent = MockAgent::succeeding("child");
    let scheduler = Scheduler::builder(mock_catalog([
        (
            "planner",
            Arc::new(MockAgent::succeeding("plan")) as Arc<dyn Agent>,
        ),
        ("scout", Arc::new(child_agent.clone()) as Arc<dyn Agent>),
    ]))
    .limits(limits())
    .clock(Arc::new(test_clock()))
    .build()
    .unwrap();

    let parent = scheduler
        .register(owner("alice"), agent_type("planner"), RegistrationOptions::new())
        .await
        .unwrap();
    let child = scheduler
        .register(
            owner("alice"),
            agent_type("scout"),
            RegistrationOptions::new()
                .with_parent(parent.id.clone())
                .with_config_value("region", json!("eu")),
        )
        .await
        .unwrap();
    let stranger = scheduler
        .register(owner("bob"), agent_type("scout"), RegistrationOptions::new())
        .await
        .unwrap();

    let parent_run = scheduler
        .invoke(&parent.id, ConfigMap::new())
        .await
        .unwrap();
    let result = scheduler
        .invoke_child(
            &parent.id,
            &child.id,
            parent_run.run_id.clone(),
            data(json!({"query": "weather"})),
        )
        .await
        .unwrap();
    assert!(result.is_success());
    assert_eq!(result.triggered_by.kind, TriggerKind::ParentAgent);
    assert_eq!(result.triggered_by.reference, parent.id.to_string());

    let input = child_agent.last_input().unwrap();
    assert_eq!(input.payload["region"], "eu");
    assert_eq!(input.payload["query"], "weather");

    let err = scheduler
        .invoke_child(&parent.id, &stranger.id, RunId::generate(), ConfigMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::NotAChild { .. }));
}

#[tokio::test]
async fn test_stop_agent_blocks_scheduled_runs_of_descendants() {
    let agent = MockAgent::succeeding("x");
    let scheduler = Scheduler::builder(mock_catalog([(
        "scout",
        Arc::new(agent.clone()) as Arc<dyn Agent>,
    )]))
    .limits(limits())
    .clock(Arc::new(test_clock()))
    .build()
    .unwrap();

    let parent = scheduler
        .register(owner("alice"), agent_type("scout"), RegistrationOptions::new())
        .await
        .unwrap();
    scheduler
        .register(
            owner("alice"),
            agent_type("scout"),
            RegistrationOptions::new()
                .with_parent(parent.id.clone())
                .with_trigger(Trigger::cron(IntervalSchedule::EveryMinutes(1))),
        )
        .await
        .unwrap();

    assert!(scheduler.stop_agent(&parent.id).await.unwrap());
    let report = scheduler.tick().await.unwrap();
    scheduler.wait_idle().await;
    assert_eq!(report.cron_dispatches, 0);
    assert_eq!(agent.call_count(), 0);

    assert!(scheduler.delete_agent(&parent.id).await.unwrap());
    assert!(scheduler.registry().is_empty().await.unwrap());
}

#[tokio::test]
async fn test_concurrent_wait_idle_callers_all_return() {
    let agent = MockAgent::succeeding("slow").with_delay(std::time::Duration::from_millis(30));
    let scheduler = Scheduler::builder(mock_catalog([(
        "scout",
        Arc::new(agent.clone()) as Arc<dyn Agent>,
    )]))
    .limits(limits())
    .clock(Arc::new(test_clock()))
    .build()
    .unwrap();

    for _ in 0..3 {
        scheduler
            .register(
                owner("alice"),
                agent_type("scout"),
                RegistrationOptions::new().with_trigger(Trigger::event("ping")),
            )
            .await
            .unwrap();
    }
    scheduler.emit("ping", ConfigMap::new());
    let report = scheduler.tick().await.unwrap();
    assert_eq!(report.event_dispatches, 3);

    let waiters = async {
        tokio::join!(
            scheduler.wait_idle(),
            scheduler.wait_idle(),
            scheduler.wait_idle()
        )
    };
    tokio::time::timeout(std::time::Duration::from_secs(2), waiters)
        .await
        .expect("every wait_idle caller should return");
    assert_eq!(agent.call_count(), 3);

    // The tracker is usable again after concurrent waits.
    scheduler.emit("ping", ConfigMap::new());
    scheduler.tick().await.unwrap();
    scheduler.wait_idle().await;
    assert_eq!(agent.call_count(), 6);
}
