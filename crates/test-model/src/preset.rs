use neo_model::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    /// The provider fails at this point of the stream.
    #[serde(rename = "failure")]
    Failure(PresetFailure),
}

/// A scripted provider failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// The preset response for an assistant step.
///
/// A streaming request plays the events one by one. A one-shot request
/// fails with the first scripted failure if there is any; otherwise it
/// answers with `reply` if set, or a well-formed reply built from the
/// concatenated deltas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// Raw one-shot reply payload, used to script odd shapes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<Value>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            reply: None,
        }
    }

    /// Creates a `PresetResponse` streaming the given text fragments.
    pub fn with_deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_events(
            deltas
                .into_iter()
                .map(|d| PresetEvent::MessageDelta(d.into()))
                .collect::<Vec<_>>(),
        )
    }

    /// Creates a `PresetResponse` that fails right away.
    pub fn failing<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self::with_events([PresetEvent::Failure(PresetFailure {
            kind,
            message: message.into(),
        })])
    }

    /// Sets the raw payload answered to one-shot requests.
    #[inline]
    pub fn with_reply(mut self, reply: Value) -> Self {
        self.reply = Some(reply);
        self
    }
}
