//! Realtime voice transport abstraction
//!
//! The provider's wire protocol lives behind `VoiceTransport`; the call core only
//! sees normalized status, transcript and diagnostic events.

pub mod backend;
pub mod simulated;

pub use backend::{
    DiagnosticMessage, EventKind, Medium, Party, SessionStatus, Transcript, TransportEvent,
    TransportFactory, VoiceTransport,
};
pub use simulated::{SimulatedTransport, SimulatedTransportFactory};
