use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::Stream;
use futures_util::stream::FusedStream;
use neo_model::{
    InferenceParams, ModelMessage, ModelProvider, ModelProviderError,
    ModelReply, ModelRequest, ModelResponse, ModelResponseEvent, ModelRole,
    StopReason,
};

use crate::conversation::{Conversation, Message};
use crate::error::Error;
use crate::settings::GenerationConfig;

type ProviderError = Box<dyn ModelProviderError>;
type BoxedFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send>>;
type BoxedResponse = Pin<Box<dyn ErasedResponse>>;
type CompleteFn =
    Arc<dyn Fn(&ModelRequest) -> BoxedFuture<ModelReply> + Send + Sync>;
type StreamFn =
    Arc<dyn Fn(&ModelRequest) -> BoxedFuture<BoxedResponse> + Send + Sync>;

/// Object-safe view of [`ModelResponse`].
trait ErasedResponse: Send {
    fn poll_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, ProviderError>>;
}

impl<R: ModelResponse> ErasedResponse for R {
    #[inline]
    fn poll_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, ProviderError>> {
        self.poll_next_event(cx)
            .map_err(|err| Box::new(err) as ProviderError)
    }
}

/// A wrapper around a model provider that provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    complete_fn: CompleteFn,
    stream_fn: StreamFn,
}

impl ModelClient {
    /// Creates a client from a provider.
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let provider = Arc::new(provider);
        let complete_fn: CompleteFn = {
            let provider = Arc::clone(&provider);
            Arc::new(move |req: &ModelRequest| -> BoxedFuture<ModelReply> {
                let fut = provider.send_request(req);
                Box::pin(async move {
                    fut.await.map_err(|err| Box::new(err) as ProviderError)
                })
            })
        };
        let stream_fn: StreamFn =
            Arc::new(move |req: &ModelRequest| -> BoxedFuture<BoxedResponse> {
                let fut = provider.send_streaming_request(req);
                Box::pin(async move {
                    match fut.await {
                        Ok(resp) => Ok(Box::pin(resp) as BoxedResponse),
                        Err(err) => Err(Box::new(err) as ProviderError),
                    }
                })
            });
        Self {
            complete_fn,
            stream_fn,
        }
    }

    /// Sends a one-shot request and returns the assistant text.
    ///
    /// The text is taken from the first content block of the reply. A reply
    /// without it is reported as [`Error::UnexpectedResponse`].
    pub async fn complete(&self, req: &ModelRequest) -> Result<String, Error> {
        debug!("sending request to {}", req.model_id);
        trace!("request: {req:?}");
        let reply = (self.complete_fn)(req).await.map_err(|err| {
            error!("request failed: {err}");
            Error::from_provider(&*err)
        })?;
        trace!("got reply: {reply:?}");

        match reply.first_text() {
            Some(text) => Ok(text.to_owned()),
            None => {
                error!("reply has no text: {reply:?}");
                Err(Error::UnexpectedResponse(
                    "no text in output.message.content".to_owned(),
                ))
            }
        }
    }

    /// Sends a streaming request.
    ///
    /// Nothing is received until the returned stream is polled.
    pub fn stream(&self, req: &ModelRequest) -> TextStream {
        debug!("sending streaming request to {}", req.model_id);
        trace!("request: {req:?}");
        TextStream {
            state: StreamState::Connecting((self.stream_fn)(req)),
            accumulated: String::new(),
            stop_reason: None,
        }
    }
}

enum StreamState {
    Connecting(BoxedFuture<BoxedResponse>),
    Receiving(BoxedResponse),
    Done,
}

/// A stream of text deltas from a streaming request.
///
/// Each item is one non-empty delta, which is also appended to
/// [`accumulated`](Self::accumulated). A failure, either before or in the
/// middle of the response, is delivered as a single `Err` item; the
/// accumulated text is discarded and the stream ends after it.
pub struct TextStream {
    state: StreamState,
    accumulated: String,
    stop_reason: Option<StopReason>,
}

impl TextStream {
    /// Returns the text received so far.
    #[inline]
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Returns why the model stopped, once it is known.
    #[inline]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Consumes the stream and returns the text received so far.
    #[inline]
    pub fn into_text(self) -> String {
        self.accumulated
    }

    fn fail(&mut self, err: ProviderError) -> Error {
        error!("streaming request failed: {err}");
        self.state = StreamState::Done;
        self.accumulated.clear();
        Error::from_provider(&*err)
    }
}

impl Stream for TextStream {
    type Item = Result<String, Error>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                StreamState::Connecting(fut) => {
                    match ready!(fut.as_mut().poll(cx)) {
                        Ok(resp) => {
                            trace!("start receiving events");
                            this.state = StreamState::Receiving(resp);
                        }
                        Err(err) => {
                            return Poll::Ready(Some(Err(this.fail(err))));
                        }
                    }
                }
                StreamState::Receiving(resp) => {
                    match ready!(resp.as_mut().poll_event(cx)) {
                        Ok(Some(ModelResponseEvent::MessageDelta(delta))) => {
                            if delta.is_empty() {
                                continue;
                            }
                            this.accumulated.push_str(&delta);
                            return Poll::Ready(Some(Ok(delta)));
                        }
                        Ok(Some(ModelResponseEvent::Completed(reason))) => {
                            debug!("model stopped: {reason:?}");
                            this.stop_reason = Some(reason);
                        }
                        Ok(None) => {
                            trace!(
                                "stream finished with {} bytes",
                                this.accumulated.len()
                            );
                            this.state = StreamState::Done;
                            return Poll::Ready(None);
                        }
                        Err(err) => {
                            return Poll::Ready(Some(Err(this.fail(err))));
                        }
                    }
                }
                StreamState::Done => return Poll::Ready(None),
            }
        }
    }
}

impl FusedStream for TextStream {
    #[inline]
    fn is_terminated(&self) -> bool {
        matches!(self.state, StreamState::Done)
    }
}

/// Merges runs of same-role messages, keeping the first message of each
/// run.
pub fn collapse_turns<'a, I>(messages: I) -> Vec<ModelMessage>
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut collapsed: Vec<ModelMessage> = vec![];
    for msg in messages {
        if collapsed
            .last()
            .is_some_and(|last| last.role == ModelRole::from(msg.role()))
        {
            continue;
        }
        collapsed.push(msg.to_model_message());
    }
    collapsed
}

/// Builds a request from the history and a snapshot of the settings.
///
/// An empty system prompt is left out of the request.
pub fn build_request(
    conversation: &Conversation,
    config: &GenerationConfig,
) -> ModelRequest {
    let system = config.system_prompt();
    ModelRequest {
        model_id: config.model().model_id().to_owned(),
        messages: collapse_turns(conversation),
        system: (!system.is_empty()).then(|| system.to_owned()),
        inference: InferenceParams {
            temperature: config.temperature(),
            top_k: config.top_k(),
        },
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use neo_model::ErrorKind;
    use neo_test_model::{
        PresetEvent, PresetFailure, PresetResponse, TestModelProvider,
    };
    use serde_json::json;

    use super::*;
    use crate::conversation::Role;

    fn hi_request() -> ModelRequest {
        let mut conversation = Conversation::default();
        conversation.push(Message::new(Role::User, "Hi"));
        build_request(&conversation, &GenerationConfig::default())
    }

    #[test]
    fn test_collapse_turns() {
        let messages = [
            Message::new(Role::User, "u1"),
            Message::new(Role::User, "u2"),
            Message::new(Role::Assistant, "a1"),
            Message::new(Role::Assistant, "a2"),
            Message::new(Role::Assistant, "a3"),
            Message::new(Role::User, "u3"),
        ];
        let collapsed = collapse_turns(&messages);
        assert_eq!(
            collapsed,
            vec![
                ModelMessage::user("u1"),
                ModelMessage::assistant("a1"),
                ModelMessage::user("u3"),
            ]
        );
        assert!(collapse_turns(std::iter::empty()).is_empty());
    }

    #[test]
    fn test_build_request() {
        let req = hi_request();
        assert_eq!(req.model_id, "anthropic.claude-3-5-sonnet-20240620-v1:0");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, ModelRole::User);
        assert!(req.system.unwrap().starts_with("You are Claude"));
        assert_eq!(req.inference.temperature, 0.5);
        assert_eq!(req.inference.top_k, 100);

        let config = GenerationConfig {
            system_prompt: String::new(),
            ..Default::default()
        };
        let req = build_request(&Conversation::default(), &config);
        assert_eq!(req.system, None);
    }

    #[tokio::test]
    async fn test_complete() {
        let client = ModelClient::new(TestModelProvider::single_turn(
            PresetResponse::with_deltas(["Hello"]),
        ));
        assert_eq!(client.complete(&hi_request()).await.unwrap(), "Hello");

        let client = ModelClient::new(TestModelProvider::single_turn(
            PresetResponse::with_deltas(["ignored"])
                .with_reply(json!({ "output": { "message": {} } })),
        ));
        assert!(matches!(
            client.complete(&hi_request()).await,
            Err(Error::UnexpectedResponse(_))
        ));

        let client = ModelClient::new(TestModelProvider::single_turn(
            PresetResponse::with_deltas(["ignored"]).with_reply(json!({
                "output": { "message": { "content": [] } }
            })),
        ));
        assert!(matches!(
            client.complete(&hi_request()).await,
            Err(Error::UnexpectedResponse(_))
        ));

        let client = ModelClient::new(TestModelProvider::single_turn(
            PresetResponse::failing(ErrorKind::RateLimitExceeded, "slow down"),
        ));
        assert_eq!(
            client.complete(&hi_request()).await,
            Err(Error::ProviderCallFailed {
                kind: ErrorKind::RateLimitExceeded,
                message: "slow down".to_owned(),
            })
        );
    }

    #[tokio::test]
    async fn test_stream() {
        let client = ModelClient::new(TestModelProvider::single_turn(
            PresetResponse::with_deltas(["Hel", "", "lo"]),
        ));
        let mut stream = client.stream(&hi_request());
        let mut deltas = vec![];
        while let Some(delta) = stream.next().await {
            deltas.push(delta.unwrap());
            assert_eq!(stream.accumulated(), deltas.concat());
        }
        assert_eq!(deltas, ["Hel", "lo"]);
        assert!(stream.is_terminated());
        assert_eq!(stream.stop_reason(), Some(StopReason::EndTurn));
        assert_eq!(stream.into_text(), "Hello");
    }

    #[tokio::test]
    async fn test_stream_failure() {
        let client = ModelClient::new(TestModelProvider::single_turn(
            PresetResponse::with_events([
                PresetEvent::MessageDelta("Par".to_owned()),
                PresetEvent::Failure(PresetFailure {
                    kind: ErrorKind::Transport,
                    message: "connection reset".to_owned(),
                }),
            ]),
        ));
        let mut stream = client.stream(&hi_request());
        assert_eq!(stream.next().await, Some(Ok("Par".to_owned())));
        assert_eq!(
            stream.next().await,
            Some(Err(Error::ProviderCallFailed {
                kind: ErrorKind::Transport,
                message: "connection reset".to_owned(),
            }))
        );
        assert_eq!(stream.accumulated(), "");
        assert!(stream.is_terminated());
        assert_eq!(stream.next().await, None);

        // The script has no step for this request.
        let client = ModelClient::new(TestModelProvider::default());
        let mut stream = client.stream(&hi_request());
        assert!(matches!(stream.next().await, Some(Err(_))));
        assert_eq!(stream.next().await, None);
    }
}
