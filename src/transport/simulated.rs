use super::backend::{Party, SessionStatus, TransportEvent, TransportFactory, VoiceTransport};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

#[derive(Default)]
struct Shared {
    /// Event sender of the currently joined transport
    current: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    join_targets: Mutex<Vec<String>>,
    joins: AtomicUsize,
    leaves: AtomicUsize,
    fail_next_join: AtomicBool,
    fail_next_leave: AtomicBool,
}

/// Factory for in-process transports that connect instantly
///
/// Clones share state, so one clone can drive the session while the call manager
/// owns another: inject events with `emit`, drop the call with `disconnect`.
#[derive(Clone, Default)]
pub struct SimulatedTransportFactory {
    shared: Arc<Shared>,
}

impl SimulatedTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to the joined session. Returns false when nothing is joined.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let tx = self.shared.current.lock().await.clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn set_status(&self, status: SessionStatus) -> bool {
        self.emit(TransportEvent::Status(status)).await
    }

    /// Report a provider-side disconnect
    pub async fn disconnect(&self) -> bool {
        self.set_status(SessionStatus::Disconnected).await
    }

    pub fn fail_next_join(&self) {
        self.shared.fail_next_join.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_leave(&self) {
        self.shared.fail_next_leave.store(true, Ordering::SeqCst);
    }

    pub fn join_count(&self) -> usize {
        self.shared.joins.load(Ordering::SeqCst)
    }

    pub fn leave_count(&self) -> usize {
        self.shared.leaves.load(Ordering::SeqCst)
    }

    /// Sessions joined and not yet left
    pub fn live_sessions(&self) -> usize {
        self.join_count().saturating_sub(self.leave_count())
    }

    pub async fn join_targets(&self) -> Vec<String> {
        self.shared.join_targets.lock().await.clone()
    }
}

impl TransportFactory for SimulatedTransportFactory {
    fn create(&self) -> Result<Box<dyn VoiceTransport>> {
        Ok(Box::new(SimulatedTransport {
            shared: Arc::clone(&self.shared),
            joined: false,
            mic_muted: false,
            speaker_muted: false,
        }))
    }
}

/// Transport created by `SimulatedTransportFactory`
pub struct SimulatedTransport {
    shared: Arc<Shared>,
    joined: bool,
    mic_muted: bool,
    speaker_muted: bool,
}

#[async_trait::async_trait]
impl VoiceTransport for SimulatedTransport {
    async fn join(&mut self, join_url: &str) -> Result<mpsc::Receiver<TransportEvent>> {
        if self.shared.fail_next_join.swap(false, Ordering::SeqCst) {
            anyhow::bail!("Simulated join failure for {}", join_url);
        }

        let (tx, rx) = mpsc::channel(64);
        tx.try_send(TransportEvent::Status(SessionStatus::Idle)).ok();

        *self.shared.current.lock().await = Some(tx);
        self.shared.join_targets.lock().await.push(join_url.to_string());
        self.shared.joins.fetch_add(1, Ordering::SeqCst);
        self.joined = true;

        info!("Simulated transport joined {}", join_url);
        Ok(rx)
    }

    async fn leave(&mut self) -> Result<()> {
        if !self.joined {
            debug!("Simulated transport was never joined, nothing to leave");
            return Ok(());
        }

        self.joined = false;
        *self.shared.current.lock().await = None;
        self.shared.leaves.fetch_add(1, Ordering::SeqCst);

        if self.shared.fail_next_leave.swap(false, Ordering::SeqCst) {
            anyhow::bail!("Simulated leave failure");
        }

        info!("Simulated transport left the session");
        Ok(())
    }

    fn is_muted(&self, party: Party) -> bool {
        match party {
            Party::User => self.mic_muted,
            Party::Agent => self.speaker_muted,
        }
    }

    fn set_muted(&mut self, party: Party, muted: bool) {
        match party {
            Party::User => self.mic_muted = muted,
            Party::Agent => self.speaker_muted = muted,
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
