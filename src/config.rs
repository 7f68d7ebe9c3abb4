use crate::call::{CallConfig, DEFAULT_TIME_EXCEEDED_MESSAGE};
use crate::fetch::RetryPolicy;
use crate::insights::mood_tracking_tool;
use crate::usage::DEFAULT_SECONDS;
use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub provider: ProviderConfig,
    pub calls: CallsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub usage: UsageConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// Provider endpoint that creates calls
    pub api_url: String,
    /// Environment variable holding the provider API key
    pub api_key_env: String,
}

#[derive(Debug, Deserialize)]
pub struct CallsConfig {
    /// Endpoint the call manager posts call configurations to
    pub create_call_url: String,
    #[serde(default = "default_time_exceeded_message")]
    pub default_time_exceeded_message: String,
}

fn default_time_exceeded_message() -> String {
    DEFAULT_TIME_EXCEEDED_MESSAGE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

/// Default conversational setup for every call
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub title: String,
    #[serde(default)]
    pub overview: String,
    pub system_prompt: String,
    pub model: String,
    pub voice: Option<String>,
    pub language_hint: Option<String>,
    pub temperature: Option<f32>,
}

impl AgentConfig {
    /// Build a call configuration, optionally overriding the model
    ///
    /// A bare override (`ultravox-8B`) keeps the default model's namespace.
    pub fn call_config(&self, model_override: Option<&str>) -> CallConfig {
        let model = match model_override {
            Some(m) if m.contains('/') => m.to_string(),
            Some(m) => match self.model.split_once('/') {
                Some((namespace, _)) => format!("{}/{}", namespace, m),
                None => m.to_string(),
            },
            None => self.model.clone(),
        };

        CallConfig {
            system_prompt: self.system_prompt.clone(),
            model: Some(model),
            voice: self.voice.clone(),
            language_hint: self.language_hint.clone(),
            temperature: self.temperature,
            selected_tools: vec![mood_tracking_tool()],
            max_duration: None,
            time_exceeded_message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsageConfig {
    pub store: StoreKind,
    pub data_dir: PathBuf,
    pub default_seconds: u64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::Memory,
            data_dir: PathBuf::from("data"),
            default_seconds: DEFAULT_SECONDS,
        }
    }
}

impl Config {
    /// Load from a config file (extension optional), overridable through
    /// `ALEX_CALLS__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ALEX_CALLS").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
