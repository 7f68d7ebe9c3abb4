//! Call-session lifecycle
//!
//! This module provides the `CallManager` that:
//! - creates a call remotely and joins the voice transport
//! - enforces the caller's duration budget
//! - relays status, transcript and diagnostic events to the UI
//! - tears every call down exactly once, however it ends, and accounts for it

mod config;
pub mod duration;
mod manager;
mod record;
mod session;

pub use config::CallConfig;
pub use duration::{parse_duration, DurationTimer, TimerHandle};
pub use manager::{
    CallEnded, CallManager, CallObserver, CallSnapshot, CallStarted, ManagerSettings,
    NoopObserver, SessionState, DEFAULT_TIME_EXCEEDED_MESSAGE,
};
pub use record::{CallOutcome, CallRecord};
pub use session::{SessionHandle, SessionListener, SubscriptionId};
