use crate::error::CallError;
use crate::transport::{EventKind, Party, TransportEvent, VoiceTransport};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives the transport events of one subscription
#[async_trait::async_trait]
pub trait SessionListener: Send + Sync {
    async fn on_event(&self, event: &TransportEvent);
}

pub type SubscriptionId = u64;

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    listener: Arc<dyn SessionListener>,
}

/// Owns one voice transport and the subscriptions attached to it
///
/// Subscriptions live exactly as long as the handle is open: `close` drains the
/// list before leaving the transport, so no listener outlives the session.
pub struct SessionHandle {
    transport: Box<dyn VoiceTransport>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    next_subscription: SubscriptionId,
    pump: Option<JoinHandle<()>>,
    closed: bool,
}

impl SessionHandle {
    pub fn new(transport: Box<dyn VoiceTransport>) -> Self {
        Self {
            transport,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            next_subscription: 0,
            pump: None,
            closed: false,
        }
    }

    /// Attach a listener for one kind of event
    pub async fn subscribe(
        &mut self,
        kind: EventKind,
        listener: Arc<dyn SessionListener>,
    ) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;

        self.subscriptions.lock().await.push(Subscription { id, kind, listener });
        id
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    /// Join the transport and start dispatching its events
    ///
    /// Returns once the transport reports connected, or with the join error.
    pub async fn open(&mut self, join_target: &str) -> Result<(), CallError> {
        if self.closed {
            return Err(CallError::Transport("Session already closed".to_string()));
        }
        if self.pump.is_some() {
            return Err(CallError::Transport("Session already open".to_string()));
        }

        info!("Joining call via {} transport", self.transport.name());

        let events = self
            .transport
            .join(join_target)
            .await
            .map_err(|e| CallError::transport(format!("{:#}", e)))?;

        self.pump = Some(Self::spawn_pump(events, Arc::clone(&self.subscriptions)));

        info!("Call joined successfully");
        Ok(())
    }

    fn spawn_pump(
        mut events: mpsc::Receiver<TransportEvent>,
        subscriptions: Arc<Mutex<Vec<Subscription>>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let kind = event.kind();
                let listeners: Vec<Arc<dyn SessionListener>> = {
                    let subscriptions = subscriptions.lock().await;
                    subscriptions
                        .iter()
                        .filter(|s| s.kind == kind)
                        .map(|s| Arc::clone(&s.listener))
                        .collect()
                };

                for listener in listeners {
                    listener.on_event(&event).await;
                }
            }

            debug!("Transport event stream ended");
        })
    }

    /// Drop every subscription and leave the transport
    ///
    /// Safe on a handle that never finished opening, and safe to repeat.
    pub async fn close(&mut self) -> Result<(), CallError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let drained = {
            let mut subscriptions = self.subscriptions.lock().await;
            let count = subscriptions.len();
            subscriptions.clear();
            count
        };
        debug!("Removed {} session subscriptions", drained);

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        info!("Leaving call...");
        self.transport
            .leave()
            .await
            .map_err(|e| CallError::transport(format!("{:#}", e)))
    }

    pub fn is_open(&self) -> bool {
        self.pump.is_some() && !self.closed
    }

    /// Flip the mute flag of one party, returning the new state
    pub fn toggle_mute(&mut self, party: Party) -> bool {
        let muted = !self.transport.is_muted(party);
        self.transport.set_muted(party, muted);
        muted
    }

    pub fn is_muted(&self, party: Party) -> bool {
        self.transport.is_muted(party)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            warn!("Session handle dropped without close");
            pump.abort();
        }
    }
}
