use serde::{Deserialize, Serialize};

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    /// The provider-specific identifier of the target model.
    pub model_id: String,
    /// The input messages, alternating between user and assistant.
    pub messages: Vec<ModelMessage>,
    /// The system instructions, if any.
    pub system: Option<String>,
    /// Sampling parameters.
    pub inference: InferenceParams,
}

/// The sampling parameters for a request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferenceParams {
    /// Randomness of the sampling, within `[0, 1]`.
    pub temperature: f32,
    /// Number of most likely candidates to sample from.
    pub top_k: u32,
}

/// The author of a message.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    /// A user input.
    User,
    /// A model output.
    Assistant,
}

/// A complete text message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelMessage {
    /// The author of the message.
    pub role: ModelRole,
    /// The text content.
    pub text: String,
}

impl ModelMessage {
    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self {
            role: ModelRole::User,
            text: text.into(),
        }
    }

    /// Creates an assistant message.
    #[inline]
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self {
            role: ModelRole::Assistant,
            text: text.into(),
        }
    }
}
