use super::config::CallConfig;
use super::duration::DurationTimer;
use super::record::{CallOutcome, CallRecord};
use super::session::{SessionHandle, SessionListener};
use crate::error::CallError;
use crate::fetch::{HttpRequest, RetryingHttpClient};
use crate::notify::{NotificationSink, Severity};
use crate::provider::JoinResponse;
use crate::transport::{
    DiagnosticMessage, EventKind, Party, SessionStatus, Transcript, TransportEvent, TransportFactory,
};
use crate::usage::{Balance, UsageRecorder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_TIME_EXCEEDED_MESSAGE: &str = "Maximum call duration reached.";

/// Lifecycle state of the manager's single call slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Ending,
}

/// Completion signal broadcast once a call has fully ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallEnded;

/// UI-side callbacks for one call
///
/// All methods default to no-ops.
#[async_trait::async_trait]
pub trait CallObserver: Send + Sync {
    async fn on_status_change(&self, _status: SessionStatus) {}

    async fn on_transcript_change(&self, _transcripts: &[Transcript]) {}

    async fn on_diagnostic(&self, _message: &DiagnosticMessage) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CallObserver for NoopObserver {}

/// Where and how calls are created
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Endpoint receiving the `CallConfig` as a JSON POST
    pub create_call_url: String,
    /// Extra headers for the create-call request (credentials)
    pub headers: Vec<(String, String)>,
    /// Used when a config sets a budget but no message
    pub default_time_exceeded_message: String,
}

impl ManagerSettings {
    pub fn new(create_call_url: impl Into<String>) -> Self {
        Self {
            create_call_url: create_call_url.into(),
            headers: Vec::new(),
            default_time_exceeded_message: DEFAULT_TIME_EXCEEDED_MESSAGE.to_string(),
        }
    }
}

/// Result of a successful `start_call`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallStarted {
    pub call_id: Uuid,
    pub join_url: String,
}

/// Point-in-time view of the call slot
#[derive(Debug, Clone, Serialize)]
pub struct CallSnapshot {
    pub state: SessionState,
    pub call_id: Option<Uuid>,
    pub caller_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct CallClock {
    /// Monotonic start, used for billing
    instant: Instant,
    wall: DateTime<Utc>,
}

impl CallClock {
    fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// Everything scoped to the current call
struct CallState {
    state: SessionState,
    call_id: Option<Uuid>,
    caller_id: Option<String>,
    started_at: Option<CallClock>,
    session: Option<SessionHandle>,
    timer: DurationTimer,
}

impl CallState {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            call_id: None,
            caller_id: None,
            started_at: None,
            session: None,
            timer: DurationTimer::new(),
        }
    }
}

/// Resources claimed from the slot by the one teardown allowed to run
struct Teardown {
    session: SessionHandle,
    call_id: Option<Uuid>,
    caller_id: Option<String>,
    started_at: Option<CallClock>,
}

struct Inner {
    settings: ManagerSettings,
    http: RetryingHttpClient,
    transports: Arc<dyn TransportFactory>,
    usage: Arc<dyn UsageRecorder>,
    notifier: Arc<dyn NotificationSink>,
    /// Serializes start and end transitions
    transition: Mutex<()>,
    state: Mutex<CallState>,
    call_ended: broadcast::Sender<CallEnded>,
    balance_updates: broadcast::Sender<Balance>,
}

/// Orchestrates the single live call: start, duration budget, event relay and
/// exactly-once teardown with usage accounting
///
/// Cloning is cheap; clones drive the same call slot.
#[derive(Clone)]
pub struct CallManager {
    inner: Arc<Inner>,
}

impl CallManager {
    pub fn new(
        settings: ManagerSettings,
        http: RetryingHttpClient,
        transports: Arc<dyn TransportFactory>,
        usage: Arc<dyn UsageRecorder>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let (call_ended, _) = broadcast::channel(16);
        let (balance_updates, _) = broadcast::channel(16);

        Self {
            inner: Arc::new(Inner {
                settings,
                http,
                transports,
                usage,
                notifier,
                transition: Mutex::new(()),
                state: Mutex::new(CallState::idle()),
                call_ended,
                balance_updates,
            }),
        }
    }

    /// Receive a `CallEnded` each time a call fully ends
    pub fn subscribe_call_ended(&self) -> broadcast::Receiver<CallEnded> {
        self.inner.call_ended.subscribe()
    }

    /// Receive the caller's balance after every successful charge
    pub fn subscribe_balance_updates(&self) -> broadcast::Receiver<Balance> {
        self.inner.balance_updates.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.state.lock().await.state
    }

    pub async fn snapshot(&self) -> CallSnapshot {
        let st = self.inner.state.lock().await;
        CallSnapshot {
            state: st.state,
            call_id: st.call_id,
            caller_id: st.caller_id.clone(),
            started_at: st.started_at.map(|c| c.wall),
            elapsed_seconds: st.started_at.map(|c| c.instant.elapsed().as_secs()),
        }
    }

    /// Start a call, ending any call that is still active first
    ///
    /// A malformed duration budget is rejected before anything else happens.
    /// Any later failure tears down whatever was acquired (recording an `error`
    /// outcome once the transport was reached) before the error is returned.
    pub async fn start_call(
        &self,
        config: CallConfig,
        caller_id: Option<String>,
        observer: Arc<dyn CallObserver>,
    ) -> Result<CallStarted, CallError> {
        let budget = config.duration_budget()?;

        let _transition = self.inner.transition.lock().await;

        let has_session = self.inner.state.lock().await.session.is_some();
        if has_session {
            info!("A call is already active, ending it first");
            if let Err(e) = self.finish(CallOutcome::Completed, None).await {
                warn!("Previous call ended with error: {}", e);
            }
        }

        let call_id = Uuid::new_v4();
        {
            // Fresh slot: nothing from an earlier attempt may leak into this call
            let mut st = self.inner.state.lock().await;
            *st = CallState::idle();
            st.state = SessionState::Starting;
            st.call_id = Some(call_id);
            st.caller_id = caller_id.clone();
        }

        info!(
            "Starting call {} for {}",
            call_id,
            caller_id.as_deref().unwrap_or("anonymous caller")
        );

        match self.establish(call_id, &config, budget, observer).await {
            Ok(join_url) => Ok(CallStarted { call_id, join_url }),
            Err(e) => {
                error!("Error starting call {}: {}", call_id, e);
                self.inner
                    .notifier
                    .notify(&format!("Error starting call: {}", e), Severity::Error);
                if let Err(end_err) = self.finish(CallOutcome::Error, None).await {
                    warn!("Cleanup after failed start also failed: {}", end_err);
                }
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        call_id: Uuid,
        config: &CallConfig,
        budget: Option<Duration>,
        observer: Arc<dyn CallObserver>,
    ) -> Result<String, CallError> {
        let join_url = self.create_call(config).await?;
        info!("Joining call: {}", join_url);

        let transport = self
            .inner
            .transports
            .create()
            .map_err(|e| CallError::transport(format!("{:#}", e)))?;
        let mut session = SessionHandle::new(transport);
        self.attach_listeners(&mut session, call_id, observer).await;

        self.inner.state.lock().await.started_at = Some(CallClock::now());
        let opened = session.open(&join_url).await;

        let mut st = self.inner.state.lock().await;
        // Stored even when opening failed, so teardown releases it
        st.session = Some(session);
        opened?;

        if let Some(budget) = budget {
            let message = config
                .time_exceeded_message
                .clone()
                .unwrap_or_else(|| self.inner.settings.default_time_exceeded_message.clone());
            let weak = Arc::downgrade(&self.inner);

            st.timer.arm(budget, move || {
                if let Some(manager) = CallManager::upgrade(&weak) {
                    manager.inner.notifier.notify(&message, Severity::Warning);
                    manager.spawn_end(call_id, CallOutcome::DurationExceeded);
                }
            });
            debug!("Call {} limited to {:?}", call_id, budget);
        }

        st.state = SessionState::Active;
        info!("Call {} active", call_id);

        Ok(join_url)
    }

    async fn create_call(&self, config: &CallConfig) -> Result<String, CallError> {
        if let Some(model) = &config.model {
            debug!("Using model {}", model);
        }

        let mut request = HttpRequest::post_json(&self.inner.settings.create_call_url, config)
            .map_err(|e| CallError::Config(e.to_string()))?;
        for (name, value) in &self.inner.settings.headers {
            request = request.header(name.clone(), value.clone());
        }

        let response = self.inner.http.send(&request).await?;
        let created: JoinResponse = response
            .json()
            .map_err(|e| CallError::Network(format!("Invalid call creation response: {}", e)))?;

        match created.join_url {
            Some(url) if !url.is_empty() => {
                debug!("Call created. Join URL: {}", url);
                Ok(url)
            }
            _ => Err(CallError::Network("Join URL is required".to_string())),
        }
    }

    async fn attach_listeners(
        &self,
        session: &mut SessionHandle,
        call_id: Uuid,
        observer: Arc<dyn CallObserver>,
    ) {
        let status = StatusListener {
            call_id,
            observer: Arc::clone(&observer),
            manager: Arc::downgrade(&self.inner),
        };
        let transcripts = TranscriptListener {
            observer: Arc::clone(&observer),
        };
        let diagnostics = DiagnosticListener { observer };

        session.subscribe(EventKind::Status, Arc::new(status)).await;
        session
            .subscribe(EventKind::Transcript, Arc::new(transcripts))
            .await;
        session
            .subscribe(EventKind::Diagnostic, Arc::new(diagnostics))
            .await;
    }

    /// End the current call; a no-op (still signalling `CallEnded`) when idle
    pub async fn end_call(&self, outcome: CallOutcome) -> Result<(), CallError> {
        let _transition = self.inner.transition.lock().await;
        self.finish(outcome, None).await
    }

    /// End a specific call; ignored when that call is no longer current
    async fn end_call_for(&self, call_id: Uuid, outcome: CallOutcome) -> Result<(), CallError> {
        let _transition = self.inner.transition.lock().await;
        self.finish(outcome, Some(call_id)).await
    }

    /// Run an internal trigger's teardown on its own task, so it can abort the
    /// task that raised it
    fn spawn_end(&self, call_id: Uuid, outcome: CallOutcome) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.end_call_for(call_id, outcome).await {
                warn!("Ending call {} ({}) failed: {}", call_id, outcome, e);
            }
        });
    }

    fn upgrade(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// The single teardown path. Caller must hold the transition lock.
    async fn finish(&self, outcome: CallOutcome, expected: Option<Uuid>) -> Result<(), CallError> {
        let claimed = {
            let mut st = self.inner.state.lock().await;

            if let Some(expected) = expected {
                if st.call_id != Some(expected) || st.session.is_none() {
                    debug!(
                        "Ignoring {} trigger for call {}, it is no longer current",
                        outcome, expected
                    );
                    return Ok(());
                }
            }

            st.timer.disarm();
            match st.session.take() {
                None => {
                    *st = CallState::idle();
                    None
                }
                Some(session) => {
                    st.state = SessionState::Ending;
                    Some(Teardown {
                        session,
                        call_id: st.call_id.take(),
                        caller_id: st.caller_id.take(),
                        started_at: st.started_at.take(),
                    })
                }
            }
        };

        let Some(mut teardown) = claimed else {
            info!("No active session to end");
            self.emit_call_ended();
            return Ok(());
        };

        info!(
            "Ending call {} ({})",
            teardown
                .call_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            outcome
        );

        if let (Some(caller_id), Some(started_at)) =
            (teardown.caller_id.as_deref(), teardown.started_at)
        {
            self.settle(teardown.call_id, caller_id, started_at, outcome)
                .await;
        } else {
            debug!("No caller or start time recorded, skipping call log");
        }

        let closed = teardown.session.close().await;

        self.inner.state.lock().await.state = SessionState::Idle;
        self.emit_call_ended();

        match closed {
            Ok(()) => {
                info!("Call ended successfully");
                Ok(())
            }
            Err(e) => {
                error!("Error ending call: {}", e);
                self.inner
                    .notifier
                    .notify(&format!("Error ending call: {}", e), Severity::Error);
                Err(e)
            }
        }
    }

    /// Write the call record and charge the caller. Failures are reported, never raised.
    async fn settle(
        &self,
        call_id: Option<Uuid>,
        caller_id: &str,
        started_at: CallClock,
        outcome: CallOutcome,
    ) {
        let elapsed = started_at.instant.elapsed();
        let duration_seconds = (elapsed.as_millis() as u64 + 500) / 1000;
        let end_time = started_at.wall
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());

        let record = CallRecord {
            call_id: call_id.unwrap_or_else(Uuid::nil),
            caller_id: caller_id.to_string(),
            start_time: started_at.wall,
            end_time,
            duration_seconds,
            outcome,
        };

        match self.inner.usage.record(&record).await {
            Ok(()) => info!(
                "Call log saved for {} ({}s, {})",
                caller_id, duration_seconds, outcome
            ),
            Err(e) => {
                error!("Error saving call log: {}", e);
                self.inner
                    .notifier
                    .notify("Error updating call records", Severity::Error);
            }
        }

        match self.inner.usage.decrement(caller_id, duration_seconds).await {
            Ok(balance) => {
                info!(
                    "Charged {} seconds to {}, {} remaining",
                    duration_seconds, caller_id, balance.seconds
                );
                // No subscribers is fine
                let _ = self.inner.balance_updates.send(balance);
            }
            Err(e) => {
                error!("Error updating balance for {}: {}", caller_id, e);
                self.inner
                    .notifier
                    .notify("Error updating remaining minutes", Severity::Error);
            }
        }
    }

    fn emit_call_ended(&self) {
        let _ = self.inner.call_ended.send(CallEnded);
    }

    /// Flip the mute flag of `party`; warns and returns `None` without a session
    pub async fn toggle_mute(&self, party: Party) -> Option<bool> {
        let mut st = self.inner.state.lock().await;
        match st.session.as_mut() {
            Some(session) => {
                let muted = session.toggle_mute(party);
                info!("{:?} muted: {}", party, muted);
                Some(muted)
            }
            None => {
                warn!("Cannot toggle mute: No active session");
                None
            }
        }
    }
}

struct StatusListener {
    call_id: Uuid,
    observer: Arc<dyn CallObserver>,
    manager: Weak<Inner>,
}

#[async_trait::async_trait]
impl SessionListener for StatusListener {
    async fn on_event(&self, event: &TransportEvent) {
        let TransportEvent::Status(status) = event else {
            return;
        };

        debug!("Status event: {}", status);
        self.observer.on_status_change(*status).await;

        if status.is_terminal() {
            if let Some(manager) = CallManager::upgrade(&self.manager) {
                info!("Provider disconnected call {}", self.call_id);
                manager.spawn_end(self.call_id, CallOutcome::Disconnected);
            }
        }
    }
}

struct TranscriptListener {
    observer: Arc<dyn CallObserver>,
}

#[async_trait::async_trait]
impl SessionListener for TranscriptListener {
    async fn on_event(&self, event: &TransportEvent) {
        if let TransportEvent::Transcripts(transcripts) = event {
            debug!("Transcript event ({} entries)", transcripts.len());
            self.observer.on_transcript_change(transcripts).await;
        }
    }
}

struct DiagnosticListener {
    observer: Arc<dyn CallObserver>,
}

#[async_trait::async_trait]
impl SessionListener for DiagnosticListener {
    async fn on_event(&self, event: &TransportEvent) {
        if let TransportEvent::Diagnostic(message) = event {
            self.observer.on_diagnostic(message).await;
        }
    }
}
