use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Shown in the panel while a request is outstanding.
pub const PENDING_RESPONSE: &str = "...";

/// Message posted to the panel, serialized as `{"type": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum PanelMessage {
    /// Echo of the raw user prompt.
    SetPrompt(Option<String>),
    /// Placeholder, answer text, or `[ERROR] ...` line.
    AddResponse(String),
}

/// Message the panel sends back when the user interacts with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    /// User clicked a code block; insert it into the editor.
    CodeSelected {
        #[serde(default)]
        value: Option<String>,
    },
    /// User typed a prompt into the panel's input box.
    Prompt {
        #[serde(default)]
        value: Option<String>,
    },
}

/// The side panel that renders prompts and responses.
#[async_trait]
pub trait PresentationSurface: Send + Sync {
    /// Make the panel visible and focused.  Surfaces that are always visible
    /// should return Ok(()) silently.
    async fn reveal(&self) -> Result<()>;

    async fn post(&self, message: PanelMessage) -> Result<()>;
}
