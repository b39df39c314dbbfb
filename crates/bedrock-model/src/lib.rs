//! A model provider for the Bedrock Converse APIs.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use neo_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelReply, ModelRequest,
};
use reqwest::{Client, Response, StatusCode, header};

pub use config::{BedrockConfig, BedrockConfigBuilder};
use io::{Chunks, EventStream};
use proto::ErrorBody;
pub use response::BedrockResponse;

const EVENT_STREAM_CONTENT_TYPE: &str = "vnd.amazon.eventstream";
const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

/// Error type for [`BedrockProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    fn transport(err: reqwest::Error) -> Self {
        Self::new(format!("{err}"), ErrorKind::Transport)
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Classifies an AWS error type name such as `ThrottlingException`.
///
/// The name may carry a `:`-separated namespace suffix, as in the
/// `x-amzn-ErrorType` header.
fn classify_error_type(error_type: &str) -> Option<ErrorKind> {
    // Stream exceptions use lower camel case (`throttlingException`).
    let name = error_type
        .split(':')
        .next()
        .unwrap_or(error_type)
        .to_ascii_lowercase();
    let kind = match name.as_str() {
        "accessdeniedexception"
        | "unrecognizedclientexception"
        | "expiredtokenexception"
        | "invalidsignatureexception" => ErrorKind::Unauthorized,
        "throttlingexception" | "servicequotaexceededexception" => {
            ErrorKind::RateLimitExceeded
        }
        "validationexception"
        | "resourcenotfoundexception"
        | "modelnotreadyexception"
        | "modeltimeoutexception"
        | "modelerrorexception"
        | "modelstreamerrorexception"
        | "internalserverexception"
        | "serviceunavailableexception" => ErrorKind::Other,
        _ => return None,
    };
    Some(kind)
}

fn classify_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ErrorKind::Unauthorized
        }
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
        _ => ErrorKind::Other,
    }
}

/// Percent-encodes a model id for use as one URL path segment.
fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for b in segment.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
        {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }
    encoded
}

/// Turns a non-success response into an [`Error`] carrying the provider's
/// diagnostic message.
async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let error_type = resp
        .headers()
        .get(ERROR_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    let body = resp.bytes().await.unwrap_or_default();
    let message = serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| format!("request failed with status {status}"));

    let kind = error_type
        .as_deref()
        .and_then(classify_error_type)
        .unwrap_or_else(|| classify_status(status));
    let message = match error_type.as_deref() {
        Some(error_type) => {
            let name = error_type.split(':').next().unwrap_or(error_type);
            format!("{name}: {message}")
        }
        None => message,
    };
    Err(Error::new(message, kind))
}

/// Bedrock model provider.
///
/// Requests are authenticated with a Bedrock API key sent as a bearer
/// token.
#[derive(Clone, Debug)]
pub struct BedrockProvider {
    client: Client,
    config: Arc<BedrockConfig>,
}

impl BedrockProvider {
    /// Creates a new `BedrockProvider` with the given configuration.
    #[inline]
    pub fn new(config: BedrockConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    fn post(
        &self,
        req: &ModelRequest,
        action: &str,
    ) -> impl Future<Output = Result<Response, reqwest::Error>> + Send + 'static
    {
        let url = format!(
            "{}/model/{}/{action}",
            self.config.endpoint,
            encode_path_segment(&req.model_id)
        );
        let body = proto::create_request(req);
        debug!("sending {action} request to {url}");
        trace!("request body: {body:?}");
        self.client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
    }
}

impl ModelProvider for BedrockProvider {
    type Error = Error;
    type Response = BedrockResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelReply, Self::Error>> + Send + 'static
    {
        let resp_fut = self.post(req, "converse");

        async move {
            let resp = resp_fut.await.map_err(Error::transport)?;
            let resp = check_status(resp).await?;
            let body = resp.bytes().await.map_err(Error::transport)?;
            trace!("got reply: {}", String::from_utf8_lossy(&body));

            serde_json::from_slice(&body).map_err(|err| {
                Error::new(
                    format!("Malformed reply body: {err}"),
                    ErrorKind::InvalidResponse,
                )
            })
        }
    }

    fn send_streaming_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let resp_fut = self.post(req, "converse-stream");

        async move {
            let resp = resp_fut.await.map_err(Error::transport)?;
            let resp = check_status(resp).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == EVENT_STREAM_CONTENT_TYPE)
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::InvalidResponse,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            Ok(BedrockResponse::from_event_stream(EventStream::new(chunks)))
        }
    }
}
