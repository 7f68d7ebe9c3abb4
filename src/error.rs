use thiserror::Error;

/// Failures surfaced by the call lifecycle and its collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Remote call creation failed after all retries
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid call configuration (e.g. a malformed duration budget)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The voice transport failed to open or close
    #[error("Transport error: {0}")]
    Transport(String),

    /// Usage accounting or call history could not be persisted
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The service-side provider credential is missing
    #[error("Server configuration error: {0}")]
    ServerConfig(String),
}

impl CallError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}
