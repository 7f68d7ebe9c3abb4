use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Status reported by the voice transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Disconnected,
    Disconnecting,
    Connecting,
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl SessionStatus {
    /// The provider has dropped the session
    pub fn is_terminal(self) -> bool {
        self == SessionStatus::Disconnected
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Disconnecting => "disconnecting",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Idle => "idle",
            SessionStatus::Listening => "listening",
            SessionStatus::Thinking => "thinking",
            SessionStatus::Speaking => "speaking",
        };
        f.write_str(s)
    }
}

/// Conversation party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    /// The signed-in caller (microphone)
    User,
    /// The AI agent (speaker output)
    Agent,
}

impl std::str::FromStr for Party {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Party::User),
            "agent" => Ok(Party::Agent),
            other => Err(format!("unknown party: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medium {
    Voice,
    Text,
}

/// One utterance in the running conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Whether the utterance is complete
    pub is_final: bool,
    pub speaker: Party,
    pub medium: Medium,
}

/// Provider debug/experimental message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    pub message: String,
}

/// Event emitted by a joined transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Status(SessionStatus),
    /// Full transcript list so far
    Transcripts(Vec<Transcript>),
    Diagnostic(DiagnosticMessage),
}

/// Subscription channel of a `TransportEvent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    Transcript,
    Diagnostic,
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::Status(_) => EventKind::Status,
            TransportEvent::Transcripts(_) => EventKind::Transcript,
            TransportEvent::Diagnostic(_) => EventKind::Diagnostic,
        }
    }
}

/// Realtime voice transport trait
///
/// One instance backs exactly one call. Implementations:
/// - provider WebRTC client (external)
/// - `SimulatedTransport` for demos and tests
#[async_trait::async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Join the session behind `join_url`
    ///
    /// Resolves once connected; returns a receiver for every subsequent event.
    async fn join(&mut self, join_url: &str) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Leave the session. Must succeed on a transport that never joined.
    async fn leave(&mut self) -> Result<()>;

    fn is_muted(&self, party: Party) -> bool;

    fn set_muted(&mut self, party: Party, muted: bool);

    /// Get transport name for logging
    fn name(&self) -> &str;
}

/// Creates a fresh transport for every call
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn VoiceTransport>>;
}
