use std::error::Error;

use crate::error::ErrorKind;
use crate::reply::ModelReply;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// The error type for a model provider.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;

    /// Returns the diagnostic message reported by the provider.
    ///
    /// The default implementation uses the `Display` output.
    fn message(&self) -> String {
        self.to_string()
    }
}

/// A type that represents a model provider, the entry for sampling
/// requests in either the one-shot or the streaming flavor.
///
/// Once the provider is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the provider should be prepared for being dropped anytime.
pub trait ModelProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// The streaming response type for this provider.
    type Response: ModelResponse<Error = Self::Error>;

    /// Sends a request and waits for the complete reply.
    ///
    /// The reply is returned as the provider delivered it. Implementations
    /// must not reject a reply just because it lacks the expected message
    /// fields; validating the shape is up to the caller.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelReply, Self::Error>> + Send + 'static;

    /// Sends a request whose reply is delivered incrementally.
    fn send_streaming_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
