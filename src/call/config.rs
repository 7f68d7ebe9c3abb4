use super::duration::parse_duration;
use crate::error::CallError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Description of the voice session to create
///
/// Serialized as-is (camelCase) into the call-creation request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallConfig {
    /// Instructions for the agent
    pub system_prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Tool definitions made available to the agent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_tools: Vec<serde_json::Value>,

    /// Maximum call length, e.g. "30m" or "420s"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<String>,

    /// Shown to the caller when `max_duration` runs out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_exceeded_message: Option<String>,
}

impl CallConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            model: None,
            voice: None,
            language_hint: None,
            temperature: None,
            selected_tools: Vec::new(),
            max_duration: None,
            time_exceeded_message: None,
        }
    }

    pub fn with_max_duration(mut self, max_duration: impl Into<String>) -> Self {
        self.max_duration = Some(max_duration.into());
        self
    }

    pub fn with_time_exceeded_message(mut self, message: impl Into<String>) -> Self {
        self.time_exceeded_message = Some(message.into());
        self
    }

    /// Parsed duration budget, if one is set
    pub fn duration_budget(&self) -> Result<Option<Duration>, CallError> {
        self.max_duration.as_deref().map(parse_duration).transpose()
    }
}
