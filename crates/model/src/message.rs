use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// The author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions prepended to the conversation.
    System,
    /// Input from the end user.
    User,
    /// Output from the model.
    Assistant,
    /// The result of a tool call.
    Tool,
}

/// A complete message in the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// The author of this message.
    pub role: Role,
    /// The text content.
    #[serde(default)]
    pub content: String,
    /// The call this message answers, only set on `tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Calls requested by the model, only set on `assistant` messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Token usage reported for producing this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl Message {
    #[inline]
    fn with_role<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: vec![],
            token_usage: None,
        }
    }

    /// Creates a system message.
    #[inline]
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Creates an assistant message without tool calls.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Creates a tool message answering the call with the given id.
    #[inline]
    pub fn tool<I: Into<String>, S: Into<String>>(
        tool_call_id: I,
        content: S,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// Returns `true` if the model asked for tool calls in this message.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Describes a tool call request from the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCall {
    /// The unique identifier assigned by the backend.
    pub id: String,
    /// The name of the capability to call.
    pub name: String,
    /// The arguments, as a JSON-encoded string.
    #[serde(default)]
    pub arguments: String,
}

/// Token accounting for one or more model calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    #[serde(alias = "prompt_tokens")]
    pub prompt_tokens: u64,
    /// Tokens generated by the model.
    #[serde(alias = "completion_tokens")]
    pub completion_tokens: u64,
    /// Sum of prompt and completion tokens.
    #[serde(alias = "total_tokens")]
    pub total_tokens: u64,
    /// Price of the call, in the backend's billing currency.
    #[serde(alias = "total_price")]
    pub total_price: f64,
}

impl TokenUsage {
    /// Returns `true` if nothing has been accounted.
    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: Self) -> Self::Output {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
            total_price: self.total_price + rhs.total_price,
        }
    }
}

impl AddAssign for TokenUsage {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_wire_shape() {
        let mut msg = Message::assistant("");
        msg.tool_calls.push(ToolCall {
            id: "call:1".to_owned(),
            name: "toggle_node".to_owned(),
            arguments: r#"{"id":"pump-1"}"#.to_owned(),
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "role": "assistant",
                "content": "",
                "toolCalls": [{
                    "id": "call:1",
                    "name": "toggle_node",
                    "arguments": "{\"id\":\"pump-1\"}"
                }]
            })
        );

        let tool = Message::tool("call:1", "ok");
        assert_eq!(
            serde_json::to_value(&tool).unwrap(),
            json!({ "role": "tool", "content": "ok", "toolCallId": "call:1" })
        );
    }

    #[test]
    fn test_token_usage_defaults() {
        let usage: TokenUsage =
            serde_json::from_value(json!({ "prompt_tokens": 12 })).unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 0);
        assert_eq!(usage.total_price, 0.0);

        let sum = usage
            + TokenUsage {
                completion_tokens: 3,
                total_tokens: 15,
                ..Default::default()
            };
        assert_eq!(sum.total_tokens, 15);
        assert!(TokenUsage::default().is_zero());
        assert!(!sum.is_zero());
    }
}
