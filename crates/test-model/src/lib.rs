//! A local fake model for testing purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use neo_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelReply, ModelRequest,
    ModelResponse, ModelResponseEvent, StopReason,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new<S: Into<String>>(message: S, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<&PresetFailure> for Error {
    fn from(failure: &PresetFailure) -> Self {
        Self::new(failure.message.clone(), failure.kind)
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let idx = this.event_idx;
            this.event_idx += 1;
            return match this.events.get(idx) {
                Some(PresetEvent::MessageDelta(msg)) => Poll::Ready(Ok(Some(
                    ModelResponseEvent::MessageDelta(msg.clone()),
                ))),
                Some(PresetEvent::Failure(failure)) => {
                    // Nothing is delivered after a failure.
                    this.event_idx = usize::MAX;
                    Poll::Ready(Err(failure.into()))
                }
                None if idx == this.events.len() => Poll::Ready(Ok(Some(
                    ModelResponseEvent::Completed(StopReason::EndTurn),
                ))),
                // In case this method is called after completion.
                None => {
                    this.event_idx = usize::MAX;
                    Poll::Ready(Ok(None))
                }
            };
        }
        if this.event_idx == usize::MAX {
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

#[derive(Clone)]
enum ConversationStep {
    UserInput,
    AssistantResponse(PresetResponse),
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script, which
/// is how the model should respond to a request. The added steps will be
/// selected according to the number of history messages in your request. If
/// there are no enough steps in the script, an error will be returned.
///
/// Every request is recorded, and clones of the provider share the record.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<ConversationStep>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl TestModelProvider {
    /// Creates a provider answering the first user message with `preset`.
    pub fn single_turn(preset: PresetResponse) -> Self {
        let mut provider = Self::default();
        provider.add_user_turn();
        provider.add_assistant_turn(preset);
        provider
    }

    #[inline]
    pub fn add_assistant_turn(&mut self, preset: PresetResponse) {
        self.conversation_script
            .push(ConversationStep::AssistantResponse(preset));
    }

    #[inline]
    pub fn add_user_turn(&mut self) {
        self.conversation_script.push(ConversationStep::UserInput);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the requests received so far.
    pub fn recorded_requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn preset_for(&self, req: &ModelRequest) -> Result<PresetResponse, Error> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }

        match self.conversation_script.get(req.messages.len()) {
            Some(ConversationStep::AssistantResponse(preset)) => {
                Ok(preset.clone())
            }
            Some(ConversationStep::UserInput) => Err(Error::new(
                "not an assistant response step",
                ErrorKind::Other,
            )),
            None => Err(Error::new("no enough steps", ErrorKind::Other)),
        }
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelReply, Self::Error>> + Send + 'static
    {
        let result = self.preset_for(req).and_then(|preset| {
            let failure = preset.events.iter().find_map(|e| match e {
                PresetEvent::Failure(failure) => Some(failure),
                _ => None,
            });
            if let Some(failure) = failure {
                return Err(failure.into());
            }

            if let Some(reply) = preset.reply {
                return serde_json::from_value(reply).map_err(|err| {
                    Error::new(format!("{err}"), ErrorKind::InvalidResponse)
                });
            }

            let text: String = preset
                .events
                .iter()
                .filter_map(|e| match e {
                    PresetEvent::MessageDelta(msg) => Some(msg.as_str()),
                    _ => None,
                })
                .collect();
            Ok(ModelReply::with_text(text))
        });
        ready(result)
    }

    fn send_streaming_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let result = self.preset_for(req).map(|preset| TestModelResponse {
            events: preset.events,
            event_idx: 0,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        });
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use neo_model::{InferenceParams, ModelMessage};
    use serde_json::json;

    use super::*;

    fn request(messages: Vec<ModelMessage>) -> ModelRequest {
        ModelRequest {
            model_id: "test".to_owned(),
            messages,
            system: None,
            inference: InferenceParams {
                temperature: 0.5,
                top_k: 100,
            },
        }
    }

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<Error>) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        loop {
            match poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await {
                Ok(Some(ModelResponseEvent::MessageDelta(delta))) => {
                    msg.push_str(&delta);
                }
                Ok(Some(ModelResponseEvent::Completed(_))) => {}
                Ok(None) => return (msg, None),
                Err(err) => return (msg, Some(err)),
            }
        }
    }

    #[tokio::test]
    async fn test_send_streaming_request() {
        let mut provider = TestModelProvider::default();
        provider.add_user_turn();
        provider.add_assistant_turn(PresetResponse::with_deltas([
            "Hello, ", "world!",
        ]));
        provider.add_user_turn();
        provider.add_assistant_turn(PresetResponse::with_events([
            PresetEvent::MessageDelta("Sure, ".to_owned()),
            PresetEvent::Failure(PresetFailure {
                kind: ErrorKind::Transport,
                message: "connection reset".to_owned(),
            }),
            PresetEvent::MessageDelta("never sent".to_owned()),
        ]));

        let mut req = request(vec![ModelMessage::user("Hi")]);
        let resp = provider.send_streaming_request(&req).await.unwrap();
        let (msg, err) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");
        assert!(err.is_none());

        req.messages.push(ModelMessage::assistant(msg));
        req.messages.push(ModelMessage::user("Check my todo"));
        let resp = provider.send_streaming_request(&req).await.unwrap();
        let (msg, err) = collect_response(resp).await;
        assert_eq!(msg, "Sure, ");
        let err = err.unwrap();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.to_string(), "connection reset");

        assert_eq!(provider.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_send_request() {
        let provider = TestModelProvider::single_turn(
            PresetResponse::with_deltas(["Hel", "lo"]),
        );
        let reply = provider
            .send_request(&request(vec![ModelMessage::user("Hi")]))
            .await
            .unwrap();
        assert_eq!(reply.first_text(), Some("Hello"));

        let provider = TestModelProvider::single_turn(
            PresetResponse::with_deltas(["ignored"])
                .with_reply(json!({ "output": { "message": {} } })),
        );
        let reply = provider
            .send_request(&request(vec![ModelMessage::user("Hi")]))
            .await
            .unwrap();
        assert_eq!(reply.first_text(), None);

        let provider = TestModelProvider::single_turn(
            PresetResponse::failing(ErrorKind::Unauthorized, "bad key"),
        );
        let err = provider
            .send_request(&request(vec![ModelMessage::user("Hi")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_missing_step() {
        let provider = TestModelProvider::default();
        let result = provider
            .send_streaming_request(&request(vec![ModelMessage::user("Hi")]))
            .await;
        assert!(result.is_err());
    }
}
