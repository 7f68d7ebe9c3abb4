use super::board::LiveCallBoard;
use crate::call::CallManager;
use crate::config::AgentConfig;
use crate::provider::ProviderClient;
use crate::usage::UsageRecorder;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: CallManager,
    pub usage: Arc<dyn UsageRecorder>,
    pub provider: ProviderClient,
    pub agent: Arc<AgentConfig>,
    /// Live view of the current call, fed by the manager's callbacks
    pub board: Arc<LiveCallBoard>,
}

impl AppState {
    pub fn new(
        manager: CallManager,
        usage: Arc<dyn UsageRecorder>,
        provider: ProviderClient,
        agent: AgentConfig,
    ) -> Self {
        Self {
            manager,
            usage,
            provider,
            agent: Arc::new(agent),
            board: Arc::new(LiveCallBoard::new()),
        }
    }
}
