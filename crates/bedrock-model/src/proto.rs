use neo_model::{ModelMessage, ModelRequest, ModelRole};
use serde::{Deserialize, Serialize};

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TextBlock {
    text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Message {
    role: ModelRole,
    content: Vec<TextBlock>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct InferenceConfig {
    temperature: f32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct AdditionalModelRequestFields {
    top_k: u32,
}

/// Body of both `Converse` and `ConverseStream`. The model id travels in
/// the URL path, not in the body.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<TextBlock>,
    inference_config: InferenceConfig,
    additional_model_request_fields: AdditionalModelRequestFields,
}

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    #[serde(alias = "Message")]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Delta {
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ContentBlockDeltaEvent {
    pub delta: Option<Delta>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStopEvent {
    pub stop_reason: Option<String>,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(req: &ModelRequest) -> ConverseRequest {
    ConverseRequest {
        messages: req.messages.iter().map(create_message).collect(),
        system: req
            .system
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| TextBlock { text: s.clone() })
            .collect(),
        inference_config: InferenceConfig {
            temperature: req.inference.temperature,
        },
        additional_model_request_fields: AdditionalModelRequestFields {
            top_k: req.inference.top_k,
        },
    }
}

#[inline]
fn create_message(msg: &ModelMessage) -> Message {
    Message {
        role: msg.role,
        content: vec![TextBlock {
            text: msg.text.clone(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use neo_model::InferenceParams;
    use serde_json::json;

    use super::*;

    fn request(system: Option<&str>) -> ModelRequest {
        ModelRequest {
            model_id: "anthropic.claude-v2:1".to_owned(),
            messages: vec![
                ModelMessage::user("Hello"),
                ModelMessage::assistant("Hi there"),
                ModelMessage::user("Tell me a joke"),
            ],
            system: system.map(ToOwned::to_owned),
            inference: InferenceParams {
                temperature: 0.25,
                top_k: 200,
            },
        }
    }

    #[test]
    fn test_create_request() {
        let body = create_request(&request(Some("Be brief.")));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "messages": [
                    { "role": "user", "content": [{ "text": "Hello" }] },
                    { "role": "assistant", "content": [{ "text": "Hi there" }] },
                    { "role": "user", "content": [{ "text": "Tell me a joke" }] }
                ],
                "system": [{ "text": "Be brief." }],
                "inferenceConfig": { "temperature": 0.25 },
                "additionalModelRequestFields": { "top_k": 200 }
            })
        );
    }

    #[test]
    fn test_empty_system_prompt_is_omitted() {
        for system in [None, Some("")] {
            let body = serde_json::to_value(create_request(&request(system)))
                .unwrap();
            assert!(body.get("system").is_none());
        }
    }

    #[test]
    fn test_parse_events() {
        let delta: ContentBlockDeltaEvent = serde_json::from_str(
            r#"{"contentBlockIndex":0,"delta":{"text":"Hel"},"p":"abcd"}"#,
        )
        .unwrap();
        assert_eq!(delta.delta.unwrap().text.as_deref(), Some("Hel"));

        let stop: MessageStopEvent =
            serde_json::from_str(r#"{"stopReason":"max_tokens"}"#).unwrap();
        assert_eq!(stop.stop_reason.as_deref(), Some("max_tokens"));

        let err: ErrorBody =
            serde_json::from_str(r#"{"Message":"Too many requests"}"#).unwrap();
        assert_eq!(err.message.as_deref(), Some("Too many requests"));
    }
}
