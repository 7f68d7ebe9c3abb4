pub mod call;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod insights;
pub mod notify;
pub mod provider;
pub mod transport;
pub mod usage;

pub use call::{
    parse_duration, CallConfig, CallEnded, CallManager, CallObserver, CallOutcome, CallRecord,
    CallStarted, ManagerSettings, SessionHandle, SessionState,
};
pub use config::Config;
pub use error::CallError;
pub use fetch::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RetryPolicy, RetryingHttpClient};
pub use http::{create_router, AppState};
pub use notify::{BroadcastNotifier, NotificationSink, Severity, TracingNotifier};
pub use provider::ProviderClient;
pub use transport::{Party, SessionStatus, SimulatedTransportFactory, TransportFactory, VoiceTransport};
pub use usage::{Balance, InMemoryUsageStore, JsonFileStore, UsageRecorder};
