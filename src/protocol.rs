//! JSON messages exchanged with the embedding host page.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Requests sent by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// Load a scene that is already in the scene library (or can be fetched).
    #[serde(rename = "LOAD_SCENE")]
    LoadScene {
        #[serde(rename = "sceneName")]
        scene_name: String,
    },
    /// Store raw MJCF text under `file_name`, then load it.
    #[serde(rename = "LOAD_XML_CONTENT")]
    LoadXmlContent {
        #[serde(rename = "fileName")]
        file_name: String,
        content: String,
    },
}

/// Replies posted back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "SCENE_LOADED")]
    SceneLoaded {
        #[serde(rename = "sceneName")]
        scene_name: String,
    },
    #[serde(rename = "ERROR")]
    Error { error: String },
}

const KNOWN_TYPES: [&str; 2] = ["LOAD_SCENE", "LOAD_XML_CONTENT"];

impl InboundMessage {
    /// Decodes a host message.
    ///
    /// Messages with an unrecognised `type` decode to `Ok(None)` so hosts can
    /// share the channel with other traffic.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Option<Self>, ProtocolError> {
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Err(ProtocolError::MissingType);
        };
        if !KNOWN_TYPES.contains(&kind) {
            debug!("ignoring host message of type {kind:?}");
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
