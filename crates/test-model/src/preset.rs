use relay_model::{TokenUsage, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "text_delta")]
    TextDelta(String),
    #[serde(rename = "function_call")]
    FunctionCall(ToolCall),
    #[serde(rename = "token_usage")]
    TokenUsage(TokenUsage),
    /// Raw bytes of the SSE body, decoded as the response is polled.
    #[serde(rename = "sse_chunk")]
    SseChunk(String),
}

/// The preset response for one model call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, `send_request` fails instead of returning a response.
    #[serde(default)]
    pub fail: bool,
    /// If set, the response never completes after its events, like a
    /// backend that stops sending bytes without closing the connection.
    #[serde(default)]
    pub stall: bool,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            ..Default::default()
        }
    }

    /// Creates a response that only contains the given text.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::TextDelta(text.into())])
    }

    /// Creates a response that calls one function.
    #[inline]
    pub fn function_call(id: &str, name: &str, arguments: Value) -> Self {
        Self::with_events([PresetEvent::FunctionCall(ToolCall {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments: arguments.to_string(),
        })])
    }

    /// Creates a response streamed as raw SSE chunks.
    #[inline]
    pub fn sse_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_events(
            chunks
                .into_iter()
                .map(|c| PresetEvent::SseChunk(c.into()))
                .collect::<Vec<_>>(),
        )
    }

    /// Appends an event.
    #[inline]
    pub fn then(mut self, event: PresetEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Makes `send_request` fail for this step.
    #[inline]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Makes the response hang after its events.
    #[inline]
    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::function_call(
            "1",
            "toggle_node",
            json!({ "id": "pump-1" }),
        )
        .then(PresetEvent::TextDelta("Toggling the pump.".to_string()))
        .then(PresetEvent::TokenUsage(TokenUsage {
            prompt_tokens: 5,
            completion_tokens: 1,
            total_tokens: 6,
            total_price: 0.25,
        }));

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
    }
}
