mod common;

use chrono::Duration as ChronoDuration;
use common::{ARTIFACTS, Harness, OWNER, SUBJECT, TICK, drain, phase_changed, wait_for_phase};
use payflow::application::recovery::ResumeOutcome;
use payflow::domain::event::OrchestratorEvent;
use payflow::domain::handle::{CorrelationId, LocalDurableHandle};
use payflow::domain::ports::{Clock, HandleStore};
use payflow::domain::session::Phase;
use payflow::domain::status::StatusValue;
use std::time::Duration;

async fn persist_handle(h: &Harness, age: Duration) -> LocalDurableHandle {
    let created_at = h.clock.now() - ChronoDuration::from_std(age).unwrap();
    let handle = LocalDurableHandle::new(OWNER, SUBJECT, CorrelationId::new("c9"), created_at);
    h.handles.save(&handle).await.unwrap();
    handle
}

#[tokio::test(start_paused = true)]
async fn test_resume_without_handle_does_nothing() {
    let h = Harness::new();
    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::NoHandle
    );
    assert_eq!(h.orchestrator.phase().await, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_stale_handle_is_discarded_without_polling() {
    let h = Harness::new();
    let mut events = h.orchestrator.subscribe();
    h.register.set(SUBJECT, StatusValue::AwaitingPayment).await;
    persist_handle(&h, Duration::from_secs(301)).await;

    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::Discarded
    );
    assert!(h.handles.load().await.unwrap().is_none());

    tokio::time::sleep(TICK * 10).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(h.orchestrator.phase().await, Phase::Idle);
    assert!(h.register.writes().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_handle_at_ttl_boundary_is_still_resumed() {
    let h = Harness::new();
    h.register.set(SUBJECT, StatusValue::AwaitingPayment).await;
    let handle = persist_handle(&h, Duration::from_secs(300)).await;

    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::ResumedPayment(handle.correlation_id)
    );
    assert_eq!(h.orchestrator.phase().await, Phase::AwaitingPayment);
}

#[tokio::test(start_paused = true)]
async fn test_restart_during_generation_never_refires() {
    let h = Harness::new();
    let mut events = h.orchestrator.subscribe();
    let correlation_id = h.orchestrator.start(OWNER, SUBJECT).await.unwrap();
    h.register
        .set(SUBJECT, StatusValue::PaymentAcknowledged)
        .await;
    wait_for_phase(&mut events, Phase::AwaitingGeneration).await;
    assert_eq!(h.ledger.attempts(), 1);

    // The process dies: polling stops, the handle survives.
    h.orchestrator.suspend().await;
    assert!(h.handles.load().await.unwrap().is_some());

    let restarted = h.another_instance();
    let mut restarted_events = restarted.subscribe();
    h.clock.advance(Duration::from_secs(60));
    assert_eq!(
        restarted.resume().await.unwrap(),
        ResumeOutcome::ResumedGeneration(correlation_id.clone())
    );
    assert_eq!(restarted.phase().await, Phase::AwaitingGeneration);
    let session = restarted.session().await.unwrap();
    assert!(session.side_effect_fired());

    tokio::time::sleep(TICK * 5).await;
    h.populate(&ARTIFACTS).await;
    let seen = wait_for_phase(&mut restarted_events, Phase::Succeeded).await;

    assert!(seen.contains(&OrchestratorEvent::SucceededOnce {
        correlation_id: correlation_id.clone()
    }));
    assert!(
        !seen
            .iter()
            .any(|event| matches!(event, OrchestratorEvent::PaymentConfirmed { .. }))
    );
    assert_eq!(h.ledger.attempts(), 1);
    assert_eq!(h.trigger.calls().await.len(), 1);
    assert!(h.handles.load().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_suspend_then_resume_in_same_process() {
    let h = Harness::new();
    let mut events = h.orchestrator.subscribe();
    let correlation_id = h.orchestrator.start(OWNER, SUBJECT).await.unwrap();

    h.orchestrator.suspend().await;
    assert_eq!(h.orchestrator.phase().await, Phase::Idle);

    // Payment clears while the host is in the background.
    h.register
        .set(SUBJECT, StatusValue::PaymentAcknowledged)
        .await;
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(h.ledger.attempts(), 0);

    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::ResumedGeneration(correlation_id)
    );
    drain(&mut events);
    h.populate(&ARTIFACTS).await;
    wait_for_phase(&mut events, Phase::Succeeded).await;

    // Recovery assumes the original session fired; it never does so itself.
    assert_eq!(h.ledger.attempts(), 0);
    assert!(h.trigger.calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resumed_payment_loop_fires_under_original_key() {
    let h = Harness::new();
    h.register.set(SUBJECT, StatusValue::AwaitingPayment).await;
    let handle = persist_handle(&h, Duration::from_secs(30)).await;
    let mut events = h.orchestrator.subscribe();

    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::ResumedPayment(handle.correlation_id.clone())
    );
    h.register
        .set(SUBJECT, StatusValue::PaymentAcknowledged)
        .await;
    let seen = wait_for_phase(&mut events, Phase::AwaitingGeneration).await;

    assert_eq!(seen[0], phase_changed(Phase::AwaitingPayment));
    let grants = h.ledger.grants().await;
    assert_eq!(grants.len(), 1);
    assert!(grants.keys().any(|key| key.as_str() == "entitlement:c9"));
}

#[tokio::test(start_paused = true)]
async fn test_resolved_flows_clear_the_handle() {
    let h = Harness::new();
    h.register
        .set(SUBJECT, StatusValue::EntitlementActive)
        .await;
    persist_handle(&h, Duration::from_secs(10)).await;
    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::Resolved
    );
    assert!(h.handles.load().await.unwrap().is_none());

    h.register
        .set(SUBJECT, StatusValue::PaymentAcknowledged)
        .await;
    h.populate(&ARTIFACTS).await;
    persist_handle(&h, Duration::from_secs(10)).await;
    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::Resolved
    );
    assert!(h.handles.load().await.unwrap().is_none());
    assert_eq!(h.orchestrator.phase().await, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_unresumable_status_discards_handle() {
    let h = Harness::new();
    h.register.set(SUBJECT, StatusValue::Neutral).await;
    persist_handle(&h, Duration::from_secs(10)).await;

    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::Discarded
    );
    assert!(h.handles.load().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_status_read_defers_resume() {
    let h = Harness::new();
    h.register.set(SUBJECT, StatusValue::AwaitingPayment).await;
    persist_handle(&h, Duration::from_secs(10)).await;
    h.register.fail_next_reads(1);

    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::Deferred
    );
    assert!(h.handles.load().await.unwrap().is_some());
    assert_eq!(h.orchestrator.phase().await, Phase::Idle);

    assert!(matches!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::ResumedPayment(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_resume_leaves_live_session_alone() {
    let h = Harness::new();
    h.orchestrator.start(OWNER, SUBJECT).await.unwrap();

    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::AlreadyActive
    );
    assert_eq!(h.orchestrator.phase().await, Phase::AwaitingPayment);
}

#[tokio::test(start_paused = true)]
async fn test_failed_side_effect_is_not_resumed() {
    let h = Harness::new();
    let mut events = h.orchestrator.subscribe();
    h.trigger.set_failing(true);
    let correlation_id = h.orchestrator.start(OWNER, SUBJECT).await.unwrap();
    h.register
        .set(SUBJECT, StatusValue::PaymentAcknowledged)
        .await;
    wait_for_phase(&mut events, Phase::Failed).await;
    drain(&mut events);

    let handle = h.handles.load().await.unwrap().unwrap();
    assert_eq!(handle.correlation_id, correlation_id);
    assert!(handle.failed);

    assert_eq!(
        h.orchestrator.resume().await.unwrap(),
        ResumeOutcome::Failed(correlation_id.clone())
    );
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(h.orchestrator.phase().await, Phase::Failed);
    assert!(drain(&mut events).is_empty());

    // A restarted process only has the handle to go on.
    let restarted = h.another_instance();
    let mut restarted_events = restarted.subscribe();
    assert_eq!(
        restarted.resume().await.unwrap(),
        ResumeOutcome::Failed(correlation_id)
    );
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(restarted.phase().await, Phase::Idle);
    assert!(drain(&mut restarted_events).is_empty());
    assert_eq!(h.ledger.attempts(), 1);
    assert!(h.trigger.calls().await.is_empty());
    assert!(h.handles.load().await.unwrap().is_some());

    // Cancel is still a way out.
    restarted.cancel().await.unwrap();
    assert!(h.handles.load().await.unwrap().is_none());
}
