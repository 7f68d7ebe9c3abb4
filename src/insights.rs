//! Mood indicators reported by the agent through its `updateOrder` tool
//!
//! The agent calls the tool whenever it hears an emotional keyword; the call
//! shows up as a diagnostic message ending in `orderDetailsData=<json array>`.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

pub const MOOD_TOOL_NAME: &str = "updateOrder";
const PAYLOAD_MARKER: &str = "orderDetailsData=";

/// One detected emotional keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodIndicator {
    pub name: String,
    #[serde(default = "one")]
    pub quantity: f64,
    #[serde(default = "one")]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

fn one() -> f64 {
    1.0
}

/// Extract mood indicators from a diagnostic message
///
/// Returns `None` for messages that are not a mood tool call or whose payload
/// is missing or malformed.
pub fn parse_mood_indicators(message: &str) -> Option<Vec<MoodIndicator>> {
    if !message.contains(MOOD_TOOL_NAME) {
        return None;
    }

    let (_, payload) = message.split_once(PAYLOAD_MARKER)?;
    let payload = payload.trim();
    if payload.is_empty() {
        debug!("Empty mood payload");
        return None;
    }

    match serde_json::from_str::<Vec<MoodIndicator>>(payload) {
        Ok(indicators) => Some(indicators),
        Err(e) => {
            debug!("Failed to parse mood payload {:?}: {}", payload, e);
            None
        }
    }
}

/// Tool definition sent with the call configuration
pub fn mood_tracking_tool() -> serde_json::Value {
    json!({
        "temporaryTool": {
            "modelToolName": MOOD_TOOL_NAME,
            "description": "Update mood indicators and emotional state tracking based on user's conversation. Call this whenever significant emotional keywords or mood indicators are detected.",
            "dynamicParameters": [{
                "name": "orderDetailsData",
                "location": "PARAMETER_LOCATION_BODY",
                "schema": {
                    "description": "An array of objects containing mood indicators and context.",
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "description": "The emotional keyword or phrase detected in the conversation." },
                            "quantity": { "type": "number", "description": "Set to 1 for mood indicators.", "default": 1 },
                            "specialInstructions": { "type": "string", "description": "Additional context or the specific phrase where the mood was detected." },
                            "price": { "type": "number", "description": "Set to 1 for mood indicators.", "default": 1 },
                            "category": {
                                "type": "string",
                                "enum": ["negative", "neutral", "positive", "distress"],
                                "description": "The category of the mood indicator."
                            }
                        },
                        "required": ["name", "quantity", "price"]
                    }
                },
                "required": true
            }],
            "client": {}
        }
    })
}
