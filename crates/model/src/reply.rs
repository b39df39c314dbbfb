use serde::{Deserialize, Serialize};

/// A complete reply from a one-shot request.
///
/// Every field is optional, since a provider may answer successfully with
/// a payload that lacks the parts a chat needs. Callers should look at the
/// reply through [`ModelReply::first_text`] and treat `None` as a reply
/// with an unexpected shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelReply {
    /// The output of the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ReplyOutput>,
    /// Why the model stopped generating, as reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Token accounting for the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// The `output` part of a [`ModelReply`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyOutput {
    /// The generated message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ReplyMessage>,
}

/// The message generated by the model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    /// Role of the author, normally `assistant`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content blocks of the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ReplyContent>>,
}

/// A content block of a [`ReplyMessage`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyContent {
    /// The text of this block. Non-text blocks leave it empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Token accounting for a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Tokens in the input.
    #[serde(default)]
    pub input_tokens: u64,
    /// Tokens generated.
    #[serde(default)]
    pub output_tokens: u64,
    /// Sum of input and output tokens.
    #[serde(default)]
    pub total_tokens: u64,
}

impl ModelReply {
    /// Creates a well-formed reply with a single text block.
    pub fn with_text<S: Into<String>>(text: S) -> Self {
        Self {
            output: Some(ReplyOutput {
                message: Some(ReplyMessage {
                    role: Some("assistant".to_owned()),
                    content: Some(vec![ReplyContent {
                        text: Some(text.into()),
                    }]),
                }),
            }),
            stop_reason: Some("end_turn".to_owned()),
            usage: None,
        }
    }

    /// Returns the text of the first content block of the output message.
    ///
    /// Returns `None` when any part of `output.message.content[0].text` is
    /// missing.
    pub fn first_text(&self) -> Option<&str> {
        self.output
            .as_ref()?
            .message
            .as_ref()?
            .content
            .as_ref()?
            .first()?
            .text
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_first_text() {
        let reply: ModelReply = serde_json::from_value(json!({
            "output": {
                "message": {
                    "role": "assistant",
                    "content": [{ "text": "Hello" }, { "text": "ignored" }]
                }
            },
            "stopReason": "end_turn",
            "usage": { "inputTokens": 3, "outputTokens": 1, "totalTokens": 4 }
        }))
        .unwrap();
        assert_eq!(reply.first_text(), Some("Hello"));
        assert_eq!(reply.usage.unwrap().total_tokens, 4);
    }

    #[test]
    fn test_missing_parts() {
        let shapes = [
            json!({}),
            json!({ "output": {} }),
            json!({ "output": { "message": { "role": "assistant" } } }),
            json!({ "output": { "message": { "content": [] } } }),
            json!({ "output": { "message": { "content": [{ "image": {} }] } } }),
        ];
        for shape in shapes {
            let reply: ModelReply = serde_json::from_value(shape).unwrap();
            assert_eq!(reply.first_text(), None);
        }
    }
}
