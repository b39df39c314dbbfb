use std::pin::Pin;
use std::task::{Context, Poll, ready};

use neo_model::{ErrorKind, ModelResponse, ModelResponseEvent, StopReason};
use pin_project_lite::pin_project;

use crate::io::{EventStream, Frame};
use crate::proto::{ContentBlockDeltaEvent, ErrorBody, MessageStopEvent};
use crate::{Error, classify_error_type};

struct PartialState {
    events: EventStream,
    // Number of text bytes received so far, only used for tracing.
    received: usize,
    stopped: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming reply from `ConverseStream`.
    pub struct BedrockResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl BedrockResponse {
    #[inline]
    pub(crate) fn from_event_stream(events: EventStream) -> Self {
        let partial_state = PartialState {
            events,
            received: 0,
            stopped: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for BedrockResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, partial_state)) => {
                    debug!(
                        "stream finished after {} bytes",
                        partial_state.received
                    );
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more frames to pull, create a new future
        // for the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

fn exception_error(frame: &Frame) -> Error {
    let exception_type = frame.exception_type().unwrap_or("UnknownException");
    let kind = classify_error_type(exception_type).unwrap_or(ErrorKind::Other);
    let message = serde_json::from_slice::<ErrorBody>(frame.payload())
        .ok()
        .and_then(|b| b.message)
        .or_else(|| frame.header_str(":error-message").map(ToOwned::to_owned))
        .unwrap_or_default();
    Error::new(format!("{exception_type}: {message}"), kind)
}

fn parse_payload<'a, T: serde::Deserialize<'a>>(
    frame: &'a Frame,
) -> Result<T, Error> {
    serde_json::from_slice(frame.payload()).map_err(|err| {
        Error::new(
            format!("Malformed event payload: {err}"),
            ErrorKind::Transport,
        )
    })
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    loop {
        let frame = match partial_state.events.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) if partial_state.stopped => break,
            Ok(None) => {
                return Err(Error::new(
                    "Event stream ended before messageStop",
                    ErrorKind::Transport,
                ));
            }
            Err(err) => {
                return Err(Error::new(
                    format!("Broken event stream: {err:?}"),
                    ErrorKind::Transport,
                ));
            }
        };

        match frame.message_type() {
            Some("event") => {}
            Some("exception") | Some("error") => {
                let err = exception_error(&frame);
                error!("stream aborted by the provider: {err}");
                return Err(err);
            }
            other => {
                return Err(Error::new(
                    format!("Unknown message type: {other:?}"),
                    ErrorKind::Transport,
                ));
            }
        }

        let event_type = frame.event_type().unwrap_or_default();
        trace!("got stream event: {event_type}");
        match event_type {
            "contentBlockDelta" => {
                let event: ContentBlockDeltaEvent = parse_payload(&frame)?;
                // Non-text deltas (tool use, reasoning) are skipped.
                let Some(text) = event.delta.and_then(|d| d.text) else {
                    continue;
                };
                if text.is_empty() {
                    continue;
                }
                partial_state.received += text.len();
                return Ok((
                    Some(ModelResponseEvent::MessageDelta(text)),
                    partial_state,
                ));
            }
            "messageStop" => {
                let event: MessageStopEvent = parse_payload(&frame)?;
                let reason = event
                    .stop_reason
                    .as_deref()
                    .map(StopReason::from_wire)
                    .unwrap_or(StopReason::Other);
                partial_state.stopped = true;
                return Ok((
                    Some(ModelResponseEvent::Completed(reason)),
                    partial_state,
                ));
            }
            _ => {}
        }
    }

    Ok((None, partial_state))
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use neo_model::ModelProviderError;

    use super::*;
    use crate::Chunks;
    use crate::io::encode_frame;

    fn event(event_type: &str, payload: &str) -> Bytes {
        encode_frame(
            &[
                (":message-type", "event"),
                (":event-type", event_type),
                (":content-type", "application/json"),
            ],
            payload.as_bytes(),
        )
    }

    fn delta(text: &str) -> Bytes {
        event(
            "contentBlockDelta",
            &format!(r#"{{"contentBlockIndex":0,"delta":{{"text":"{text}"}}}}"#),
        )
    }

    async fn collect(
        frames: Vec<Bytes>,
    ) -> (Vec<ModelResponseEvent>, Option<Error>) {
        let chunks = Chunks::from_vec_deque(frames.into());
        let mut resp =
            pin!(BedrockResponse::from_event_stream(EventStream::new(chunks)));
        let mut events = vec![];
        loop {
            match poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => return (events, None),
                Err(err) => {
                    // The response must stay finished after an error.
                    let after =
                        poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
                    assert!(matches!(after, Ok(None)));
                    return (events, Some(err));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_simple_events() {
        let (events, err) = collect(vec![
            event("messageStart", r#"{"role":"assistant"}"#),
            delta("Hel"),
            delta("lo"),
            event("contentBlockStop", r#"{"contentBlockIndex":0}"#),
            event("messageStop", r#"{"stopReason":"end_turn"}"#),
            event(
                "metadata",
                r#"{"usage":{"inputTokens":1,"outputTokens":2,"totalTokens":3}}"#,
            ),
        ])
        .await;
        assert!(err.is_none());
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("Hel".to_owned()),
                ModelResponseEvent::MessageDelta("lo".to_owned()),
                ModelResponseEvent::Completed(StopReason::EndTurn),
            ]
        );
    }

    #[tokio::test]
    async fn test_exception_mid_stream() {
        let exception = encode_frame(
            &[
                (":message-type", "exception"),
                (":exception-type", "throttlingException"),
                (":content-type", "application/json"),
            ],
            br#"{"message":"Too many tokens, please wait"}"#,
        );
        let (events, err) = collect(vec![delta("Par"), exception]).await;
        assert_eq!(
            events,
            vec![ModelResponseEvent::MessageDelta("Par".to_owned())]
        );
        let err = err.unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(
            err.message(),
            "throttlingException: Too many tokens, please wait"
        );
    }

    #[tokio::test]
    async fn test_non_text_deltas_are_skipped() {
        let (events, err) = collect(vec![
            event(
                "contentBlockDelta",
                r#"{"contentBlockIndex":0,"delta":{"toolUse":{"input":"{}"}}}"#,
            ),
            delta("ok"),
            event("messageStop", r#"{"stopReason":"max_tokens"}"#),
        ])
        .await;
        assert!(err.is_none());
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("ok".to_owned()),
                ModelResponseEvent::Completed(StopReason::MaxTokens),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_cut_before_stop() {
        let (events, err) = collect(vec![
            event("messageStart", r#"{"role":"assistant"}"#),
            delta("Half a rep"),
        ])
        .await;
        assert_eq!(
            events,
            vec![ModelResponseEvent::MessageDelta("Half a rep".to_owned())]
        );
        let err = err.unwrap();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.message(), "Event stream ended before messageStop");
    }

    #[tokio::test]
    async fn test_broken_stream() {
        let frame = delta("Hello");
        let (events, err) =
            collect(vec![delta("Hi"), frame.slice(..frame.len() - 2)]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(err.unwrap().kind(), ErrorKind::Transport);
    }
}
