/// Wire types for the Anthropic Messages API
use serde::Deserialize;

use crate::domain::ports::{ContentBlock, StopSignal, TurnResponse};

/// Raw messages-endpoint response body.
///
/// Only the fields the engine consumes are modeled. Unknown content
/// block types would fail deserialization, which surfaces as a
/// `MalformedResponse` in the client.
#[derive(Debug, Deserialize)]
pub struct WireResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    /// Absent while a turn is still streaming; the non-streaming
    /// endpoint always sets it.
    pub stop_reason: Option<StopSignal>,
}

impl From<WireResponse> for TurnResponse {
    fn from(wire: WireResponse) -> Self {
        Self {
            content: wire.content,
            stop: wire.stop_reason.unwrap_or(StopSignal::EndTurn),
        }
    }
}
