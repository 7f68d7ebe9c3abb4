// Integration tests for the call lifecycle
//
// Every test runs on a paused tokio clock, so call durations, duration budgets
// and retry backoff are exact.

mod common;

use alex_calls::call::NoopObserver;
use alex_calls::notify::Severity;
use alex_calls::transport::{DiagnosticMessage, Medium, Party, SessionStatus, Transcript, TransportEvent};
use alex_calls::usage::Balance;
use alex_calls::{
    CallConfig, CallError, CallManager, CallObserver, CallOutcome, CallRecord, ManagerSettings,
    SessionState, SimulatedTransportFactory, UsageRecorder,
};
use common::{harness, harness_with, retrying, RecordingNotifier, ScriptedEndpoint, CREATE_CALL_URL};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

fn config() -> CallConfig {
    CallConfig::new("You are Alex, a warm voice companion.")
}

fn caller(id: &str) -> Option<String> {
    Some(id.to_string())
}

fn noop() -> Arc<dyn CallObserver> {
    Arc::new(NoopObserver)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn end_call_without_session_only_signals_completion() {
    let h = harness();
    let mut ended = h.manager.subscribe_call_ended();

    h.manager.end_call(CallOutcome::Completed).await.unwrap();

    assert!(ended.try_recv().is_ok());
    assert_eq!(ended.try_recv().unwrap_err(), TryRecvError::Empty);
    assert!(h.usage.records().await.is_empty());
    assert_eq!(h.manager.state().await, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn start_call_joins_the_created_session() {
    let h = harness();
    let config = config().with_max_duration("10m");

    let started = h
        .manager
        .start_call(config, caller("u1"), noop())
        .await
        .unwrap();

    assert_eq!(h.manager.state().await, SessionState::Active);
    assert_eq!(started.join_url, "wss://voice.test/call-0");
    assert_eq!(h.transports.join_targets().await, vec![started.join_url.clone()]);

    let snapshot = h.manager.snapshot().await;
    assert_eq!(snapshot.call_id, Some(started.call_id));
    assert_eq!(snapshot.caller_id.as_deref(), Some("u1"));

    // The full config is posted to the create-call endpoint
    let requests = h.endpoint.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, CREATE_CALL_URL);
    let body = &requests[0].body;
    assert_eq!(body["systemPrompt"], "You are Alex, a warm voice companion.");
    assert_eq!(body["maxDuration"], "10m");
}

#[tokio::test(start_paused = true)]
async fn explicit_end_records_and_charges_once() {
    let h = harness();
    h.usage.set_balance("u1", 100).await;
    let mut ended = h.manager.subscribe_call_ended();

    h.manager.start_call(config(), caller("u1"), noop()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    h.manager.end_call(CallOutcome::Completed).await.unwrap();

    let records = h.usage.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].caller_id, "u1");
    assert_eq!(records[0].outcome, CallOutcome::Completed);
    assert_eq!(records[0].duration_seconds, 5);
    assert!(records[0].end_time >= records[0].start_time);

    assert_eq!(h.usage.balance("u1").await.unwrap().unwrap().seconds, 95);
    assert_eq!(h.transports.live_sessions(), 0);
    assert_eq!(h.manager.state().await, SessionState::Idle);
    assert!(ended.try_recv().is_ok());
    assert_eq!(ended.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test(start_paused = true)]
async fn duration_budget_ends_call_and_floors_balance() {
    let h = harness();
    h.usage.set_balance("u1", 1).await;
    let mut ended = h.manager.subscribe_call_ended();

    let config = config()
        .with_max_duration("2s")
        .with_time_exceeded_message("Your minutes have been used up.");
    h.manager.start_call(config, caller("u1"), noop()).await.unwrap();

    ended.recv().await.unwrap();

    let records = h.usage.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::DurationExceeded);
    assert_eq!(records[0].duration_seconds, 2);
    assert_eq!(h.usage.balance("u1").await.unwrap().unwrap().seconds, 0);

    assert!(h
        .notes
        .notes()
        .contains(&("Your minutes have been used up.".to_string(), Severity::Warning)));
    assert_eq!(h.transports.live_sessions(), 0);
    assert_eq!(h.manager.state().await, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn duration_budget_uses_default_message() {
    let h = harness();
    let mut ended = h.manager.subscribe_call_ended();

    h.manager
        .start_call(config().with_max_duration("1s"), None, noop())
        .await
        .unwrap();
    ended.recv().await.unwrap();

    assert!(h.notes.contains("Maximum call duration reached."));
}

#[tokio::test(start_paused = true)]
async fn provider_disconnect_records_once_and_cancels_budget() {
    let h = harness();
    h.usage.set_balance("u1", 420).await;
    let mut ended = h.manager.subscribe_call_ended();

    h.manager
        .start_call(config().with_max_duration("60s"), caller("u1"), noop())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.transports.disconnect().await);
    ended.recv().await.unwrap();

    let records = h.usage.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::Disconnected);
    assert_eq!(records[0].duration_seconds, 10);
    assert_eq!(h.usage.balance("u1").await.unwrap().unwrap().seconds, 410);

    // The original budget passes without a late second teardown
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.usage.records().await.len(), 1);
    assert_eq!(ended.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(h.transports.join_count(), 1);
    assert_eq!(h.transports.leave_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn starting_while_active_ends_previous_call_first() {
    let h = harness();
    h.usage.set_balance("u1", 300).await;

    let first = h.manager.start_call(config(), caller("u1"), noop()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    let second = h.manager.start_call(config(), caller("u1"), noop()).await.unwrap();

    assert_ne!(first.call_id, second.call_id);
    let records = h.usage.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].call_id, first.call_id);
    assert_eq!(records[0].outcome, CallOutcome::Completed);
    assert_eq!(records[0].duration_seconds, 4);
    assert_eq!(h.usage.balance("u1").await.unwrap().unwrap().seconds, 296);

    assert_eq!(h.transports.join_count(), 2);
    assert_eq!(h.transports.live_sessions(), 1);
    assert_eq!(h.manager.state().await, SessionState::Active);
    assert_eq!(h.manager.snapshot().await.call_id, Some(second.call_id));
}

#[tokio::test(start_paused = true)]
async fn budget_expiry_racing_explicit_end_is_charged_once() {
    let h = harness();
    h.usage.set_balance("u1", 100).await;

    h.manager
        .start_call(config().with_max_duration("2s"), caller("u1"), noop())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    h.manager.end_call(CallOutcome::Completed).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let records = h.usage.records().await;
    assert_eq!(records.len(), 1);
    assert!(matches!(
        records[0].outcome,
        CallOutcome::Completed | CallOutcome::DurationExceeded
    ));
    assert_eq!(records[0].duration_seconds, 2);
    assert_eq!(h.usage.balance("u1").await.unwrap().unwrap().seconds, 98);
    assert_eq!(h.transports.leave_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn fired_budget_wins_over_a_later_explicit_end() {
    let h = harness();
    h.usage.set_balance("u1", 100).await;
    let mut ended = h.manager.subscribe_call_ended();

    h.manager
        .start_call(config().with_max_duration("2s"), caller("u1"), noop())
        .await
        .unwrap();

    // Let the expiry teardown run to completion before the user hangs up
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert!(h.notes.contains("Maximum call duration reached."));
    assert!(ended.try_recv().is_ok());

    h.manager.end_call(CallOutcome::Completed).await.unwrap();

    let records = h.usage.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::DurationExceeded);
    assert_eq!(records[0].duration_seconds, 2);
    assert_eq!(h.usage.balance("u1").await.unwrap().unwrap().seconds, 98);
    assert_eq!(h.transports.leave_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_end_calls_collapse_into_one_teardown() {
    let h = harness();
    h.usage.set_balance("u1", 100).await;
    h.manager.start_call(config(), caller("u1"), noop()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let (a, b) = tokio::join!(
        h.manager.end_call(CallOutcome::Completed),
        h.manager.end_call(CallOutcome::Completed)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.usage.records().await.len(), 1);
    assert_eq!(h.usage.balance("u1").await.unwrap().unwrap().seconds, 97);
    assert_eq!(h.transports.leave_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn network_failure_after_retries_does_not_start_a_call() {
    let h = harness_with(ScriptedEndpoint::failing(5));
    let mut ended = h.manager.subscribe_call_ended();

    let before = tokio::time::Instant::now();
    let err = h
        .manager
        .start_call(config(), caller("u1"), noop())
        .await
        .unwrap_err();
    let waited = before.elapsed();

    assert!(matches!(err, CallError::Network(_)), "got {:?}", err);
    assert_eq!(h.endpoint.attempts(), 3);
    assert!(waited >= Duration::from_secs(3) && waited < Duration::from_millis(3100));

    assert_eq!(h.transports.join_count(), 0);
    assert!(h.usage.records().await.is_empty());
    assert_eq!(h.manager.state().await, SessionState::Idle);
    assert!(ended.try_recv().is_ok());
    assert!(h.notes.contains("Error starting call"));
}

#[tokio::test(start_paused = true)]
async fn invalid_budget_is_rejected_before_anything_changes() {
    let h = harness();
    let live = h.manager.start_call(config(), caller("u1"), noop()).await.unwrap();
    let mut ended = h.manager.subscribe_call_ended();

    let err = h
        .manager
        .start_call(config().with_max_duration("ten minutes"), caller("u1"), noop())
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::Config(_)));
    assert_eq!(h.endpoint.attempts(), 1);
    assert_eq!(h.manager.state().await, SessionState::Active);
    assert_eq!(h.manager.snapshot().await.call_id, Some(live.call_id));
    assert_eq!(ended.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test(start_paused = true)]
async fn join_failure_tears_down_and_records_error() {
    let h = harness();
    h.usage.set_balance("u1", 100).await;
    h.transports.fail_next_join();
    let mut ended = h.manager.subscribe_call_ended();

    let err = h
        .manager
        .start_call(config().with_max_duration("1m"), caller("u1"), noop())
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::Transport(_)));
    let records = h.usage.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::Error);
    assert_eq!(records[0].duration_seconds, 0);
    assert_eq!(h.transports.live_sessions(), 0);
    assert_eq!(h.manager.state().await, SessionState::Idle);
    assert!(ended.try_recv().is_ok());

    // No budget timer survived the failed start
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.usage.records().await.len(), 1);
    assert_eq!(ended.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test(start_paused = true)]
async fn leave_failure_still_releases_everything() {
    let h = harness();
    h.usage.set_balance("u1", 100).await;
    let mut ended = h.manager.subscribe_call_ended();

    h.manager.start_call(config(), caller("u1"), noop()).await.unwrap();
    h.transports.fail_next_leave();
    let err = h.manager.end_call(CallOutcome::Completed).await.unwrap_err();

    assert!(matches!(err, CallError::Transport(_)));
    assert_eq!(h.usage.records().await.len(), 1);
    assert_eq!(h.manager.state().await, SessionState::Idle);
    assert!(ended.try_recv().is_ok());
    assert!(h.notes.contains("Error ending call"));

    // Slot is reusable
    h.manager.start_call(config(), caller("u1"), noop()).await.unwrap();
    assert_eq!(h.manager.state().await, SessionState::Active);
}

#[tokio::test(start_paused = true)]
async fn anonymous_calls_are_not_accounted() {
    let h = harness();

    h.manager.start_call(config(), None, noop()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    h.manager.end_call(CallOutcome::Completed).await.unwrap();

    assert!(h.usage.records().await.is_empty());
    assert_eq!(h.transports.leave_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_budget_timer_cannot_end_a_newer_call() {
    let h = harness();

    h.manager
        .start_call(config().with_max_duration("5s"), caller("u1"), noop())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.manager.end_call(CallOutcome::Completed).await.unwrap();

    let second = h.manager.start_call(config(), caller("u1"), noop()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.manager.state().await, SessionState::Active);
    assert_eq!(h.manager.snapshot().await.call_id, Some(second.call_id));
    assert_eq!(h.usage.records().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn balance_updates_are_broadcast_after_charging() {
    let h = harness();
    h.usage.set_balance("u1", 60).await;
    let mut balances = h.manager.subscribe_balance_updates();

    h.manager.start_call(config(), caller("u1"), noop()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    h.manager.end_call(CallOutcome::Completed).await.unwrap();

    let balance: Balance = balances.recv().await.unwrap();
    assert_eq!(balance.caller_id, "u1");
    assert_eq!(balance.seconds, 40);
}

#[tokio::test(start_paused = true)]
async fn toggle_mute_requires_a_session() {
    let h = harness();
    assert_eq!(h.manager.toggle_mute(Party::User).await, None);

    h.manager.start_call(config(), None, noop()).await.unwrap();
    assert_eq!(h.manager.toggle_mute(Party::User).await, Some(true));
    assert_eq!(h.manager.toggle_mute(Party::Agent).await, Some(true));
    assert_eq!(h.manager.toggle_mute(Party::User).await, Some(false));

    h.manager.end_call(CallOutcome::Completed).await.unwrap();
    assert_eq!(h.manager.toggle_mute(Party::Agent).await, None);
}

#[derive(Default)]
struct Collecting {
    statuses: Mutex<Vec<SessionStatus>>,
    transcripts: Mutex<Vec<Vec<Transcript>>>,
    diagnostics: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl CallObserver for Collecting {
    async fn on_status_change(&self, status: SessionStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    async fn on_transcript_change(&self, transcripts: &[Transcript]) {
        self.transcripts.lock().unwrap().push(transcripts.to_vec());
    }

    async fn on_diagnostic(&self, message: &DiagnosticMessage) {
        self.diagnostics.lock().unwrap().push(message.message.clone());
    }
}

#[tokio::test(start_paused = true)]
async fn session_events_reach_the_observer_until_teardown() {
    let h = harness();
    let observer = Arc::new(Collecting::default());

    h.manager
        .start_call(config(), None, observer.clone())
        .await
        .unwrap();

    h.transports.set_status(SessionStatus::Listening).await;
    h.transports
        .emit(TransportEvent::Transcripts(vec![Transcript {
            text: "Hi Alex".to_string(),
            is_final: true,
            speaker: Party::User,
            medium: Medium::Voice,
        }]))
        .await;
    h.transports
        .emit(TransportEvent::Diagnostic(DiagnosticMessage {
            message: "debug: turn started".to_string(),
        }))
        .await;
    settle().await;

    assert_eq!(
        *observer.statuses.lock().unwrap(),
        vec![SessionStatus::Idle, SessionStatus::Listening]
    );
    assert_eq!(observer.transcripts.lock().unwrap()[0][0].text, "Hi Alex");
    assert_eq!(
        *observer.diagnostics.lock().unwrap(),
        vec!["debug: turn started".to_string()]
    );

    h.manager.end_call(CallOutcome::Completed).await.unwrap();
    assert!(!h.transports.set_status(SessionStatus::Speaking).await);
    settle().await;
    assert_eq!(observer.statuses.lock().unwrap().len(), 2);
}

/// Recorder whose storage is down
struct BrokenRecorder;

#[async_trait::async_trait]
impl UsageRecorder for BrokenRecorder {
    async fn record(&self, _record: &CallRecord) -> Result<(), CallError> {
        Err(CallError::Persistence("history unavailable".to_string()))
    }

    async fn decrement(&self, _caller_id: &str, _seconds: u64) -> Result<Balance, CallError> {
        Err(CallError::Persistence("wallet unavailable".to_string()))
    }

    async fn balance(&self, _caller_id: &str) -> Result<Option<Balance>, CallError> {
        Ok(None)
    }

    async fn ensure_account(&self, caller_id: &str) -> Result<Balance, CallError> {
        Ok(Balance::new(caller_id, 0))
    }

    async fn history(&self, _caller_id: &str) -> Result<Vec<CallRecord>, CallError> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn persistence_failures_never_block_teardown() {
    let transports = SimulatedTransportFactory::new();
    let notes = Arc::new(RecordingNotifier::default());
    let manager = CallManager::new(
        ManagerSettings::new(CREATE_CALL_URL),
        retrying(ScriptedEndpoint::ok()),
        Arc::new(transports.clone()),
        Arc::new(BrokenRecorder),
        notes.clone(),
    );
    let mut ended = manager.subscribe_call_ended();

    manager.start_call(config(), caller("u1"), noop()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    manager.end_call(CallOutcome::Completed).await.unwrap();

    assert_eq!(transports.live_sessions(), 0);
    assert_eq!(manager.state().await, SessionState::Idle);
    assert!(ended.try_recv().is_ok());
    assert!(notes.contains("Error updating call records"));
    assert!(notes.contains("Error updating remaining minutes"));
}
