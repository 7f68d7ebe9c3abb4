// Shared fixtures for the integration tests
#![allow(dead_code)]

use alex_calls::fetch::{HttpRequest, HttpResponse, HttpTransport, RetryPolicy, RetryingHttpClient};
use alex_calls::notify::{NotificationSink, Severity};
use alex_calls::{CallManager, InMemoryUsageStore, ManagerSettings, SimulatedTransportFactory};
use anyhow::Result;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const CREATE_CALL_URL: &str = "http://calls.test/api/calls";

/// Call-creation endpoint that fails a fixed number of times, then hands out join URLs
#[derive(Default)]
pub struct ScriptedEndpoint {
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedEndpoint {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(times: usize) -> Arc<Self> {
        let endpoint = Self::default();
        endpoint.failures_left.store(times, Ordering::SeqCst);
        Arc::new(endpoint)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedEndpoint {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Ok(HttpResponse::new(503, "unavailable"));
        }

        let body = json!({
            "callId": format!("call-{}", attempt),
            "joinUrl": format!("wss://voice.test/call-{}", attempt),
        });
        Ok(HttpResponse::new(200, body.to_string()))
    }
}

/// Notification sink that remembers everything it was given
#[derive(Default)]
pub struct RecordingNotifier {
    notes: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    pub fn notes(&self) -> Vec<(String, Severity)> {
        self.notes.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.notes().iter().any(|(m, _)| m.contains(needle))
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        self.notes.lock().unwrap().push((message.to_string(), severity));
    }
}

pub struct Harness {
    pub manager: CallManager,
    pub transports: SimulatedTransportFactory,
    pub usage: Arc<InMemoryUsageStore>,
    pub endpoint: Arc<ScriptedEndpoint>,
    pub notes: Arc<RecordingNotifier>,
}

pub fn retrying(endpoint: Arc<ScriptedEndpoint>) -> RetryingHttpClient {
    RetryingHttpClient::new(endpoint, RetryPolicy::default())
}

pub fn harness_with(endpoint: Arc<ScriptedEndpoint>) -> Harness {
    let transports = SimulatedTransportFactory::new();
    let usage = Arc::new(InMemoryUsageStore::new());
    let notes = Arc::new(RecordingNotifier::default());

    let manager = CallManager::new(
        ManagerSettings::new(CREATE_CALL_URL),
        retrying(Arc::clone(&endpoint)),
        Arc::new(transports.clone()),
        usage.clone(),
        notes.clone(),
    );

    Harness {
        manager,
        transports,
        usage,
        endpoint,
        notes,
    }
}

pub fn harness() -> Harness {
    harness_with(ScriptedEndpoint::ok())
}
