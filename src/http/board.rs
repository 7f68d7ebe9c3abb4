use crate::call::{CallEnded, CallObserver};
use crate::insights::{parse_mood_indicators, MoodIndicator};
use crate::notify::Notification;
use crate::transport::{DiagnosticMessage, SessionStatus, Transcript};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

/// Notifications kept on the board
const MAX_NOTIFICATIONS: usize = 20;

/// What the UI currently shows for the live call
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveCall {
    pub status: Option<SessionStatus>,
    pub transcripts: Vec<Transcript>,
    pub diagnostics: Vec<DiagnosticMessage>,
    pub insights: Vec<MoodIndicator>,
    pub notifications: Vec<Notification>,
}

/// Collects call events for the UI and clears them when a call ends
#[derive(Debug, Default)]
pub struct LiveCallBoard {
    live: RwLock<LiveCall>,
}

impl LiveCallBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> LiveCall {
        self.live.read().await.clone()
    }

    /// Clear everything tied to the current call; notifications are kept
    pub async fn reset(&self) {
        let mut live = self.live.write().await;
        let notifications = std::mem::take(&mut live.notifications);
        *live = LiveCall {
            notifications,
            ..LiveCall::default()
        };
    }

    pub async fn push_notification(&self, notification: Notification) {
        let mut live = self.live.write().await;
        live.notifications.push(notification);
        let overflow = live.notifications.len().saturating_sub(MAX_NOTIFICATIONS);
        live.notifications.drain(..overflow);
    }

    /// Reset the call view on every completion signal and collect notifications
    /// until both channels close
    pub fn watch(
        self: std::sync::Arc<Self>,
        mut ended: broadcast::Receiver<CallEnded>,
        mut notifications: broadcast::Receiver<Notification>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ended_open = true;
            let mut notifications_open = true;

            while ended_open || notifications_open {
                tokio::select! {
                    signal = ended.recv(), if ended_open => match signal {
                        Ok(CallEnded) => {
                            debug!("Call ended, clearing live board");
                            self.reset().await;
                        }
                        Err(RecvError::Lagged(_)) => self.reset().await,
                        Err(RecvError::Closed) => ended_open = false,
                    },
                    note = notifications.recv(), if notifications_open => match note {
                        Ok(note) => self.push_notification(note).await,
                        Err(RecvError::Lagged(missed)) => {
                            debug!("Board missed {} notifications", missed);
                        }
                        Err(RecvError::Closed) => notifications_open = false,
                    },
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl CallObserver for LiveCallBoard {
    async fn on_status_change(&self, status: SessionStatus) {
        self.live.write().await.status = Some(status);
    }

    async fn on_transcript_change(&self, transcripts: &[Transcript]) {
        self.live.write().await.transcripts = transcripts.to_vec();
    }

    async fn on_diagnostic(&self, message: &DiagnosticMessage) {
        let mut live = self.live.write().await;
        live.diagnostics.push(message.clone());
        if let Some(indicators) = parse_mood_indicators(&message.message) {
            live.insights.extend(indicators);
        }
    }
}
